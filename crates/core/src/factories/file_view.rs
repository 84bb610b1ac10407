//! A view provider backed by a JSON file.

use resync_api::*;
use std::path::PathBuf;
use std::sync::Arc;

/// A [ViewProvider] reading the view from a JSON file on every fetch, so
/// edits to the file are picked up by the next pass.
///
/// ```json
/// {
///   "generation": 3,
///   "buckets": [
///     { "owners": ["10.0.0.1:11211", "10.0.0.2:11211"] },
///     { "owners": ["10.0.0.2:11211"], "former": ["10.0.0.1:11211"] }
///   ]
/// }
/// ```
#[derive(Debug)]
pub struct FileViewProvider {
    self_addr: PeerAddr,
    path: PathBuf,
}

impl FileViewProvider {
    /// Read the view of the node at `self_addr` from `path`.
    pub fn create(
        self_addr: PeerAddr,
        path: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            self_addr,
            path: path.into(),
        })
    }
}

impl ViewProvider for FileViewProvider {
    fn current_view(&self) -> BoxFut<'_, ResyncResult<View>> {
        Box::pin(async move {
            let data = tokio::fs::read(&self.path).await.map_err(|err| {
                ResyncError::other_src(
                    format!("reading view file {}", self.path.display()),
                    err,
                )
            })?;
            serde_json::from_slice(&data).map_err(|err| {
                ResyncError::other_src(
                    format!("parsing view file {}", self.path.display()),
                    err,
                )
            })
        })
    }

    fn self_address(&self) -> PeerAddr {
        self.self_addr.clone()
    }
}
