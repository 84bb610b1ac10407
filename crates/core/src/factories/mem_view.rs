//! A view provider serving a view held in memory.

use resync_api::*;
use std::sync::{Arc, Mutex};

/// A [ViewProvider] serving a view set in memory.
#[derive(Debug)]
pub struct MemViewProvider {
    self_addr: PeerAddr,
    view: Mutex<Option<View>>,
}

impl MemViewProvider {
    /// Serve `view` to the node at `self_addr`.
    pub fn create(self_addr: PeerAddr, view: View) -> Arc<Self> {
        Arc::new(Self {
            self_addr,
            view: Mutex::new(Some(view)),
        })
    }

    /// Serve `view` from now on.
    pub fn set_view(&self, view: View) {
        *self.view.lock().unwrap() = Some(view);
    }

    /// Fail every fetch until the next [MemViewProvider::set_view].
    pub fn set_unavailable(&self) {
        *self.view.lock().unwrap() = None;
    }
}

impl ViewProvider for MemViewProvider {
    fn current_view(&self) -> BoxFut<'_, ResyncResult<View>> {
        let view = self.view.lock().unwrap().clone();
        Box::pin(async move {
            view.ok_or_else(|| ResyncError::other("view provider unavailable"))
        })
    }

    fn self_address(&self) -> PeerAddr {
        self.self_addr.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use resync_test_utils::peer::peer;
    use resync_test_utils::view::TestView;

    #[tokio::test]
    async fn mem_view_can_become_unavailable() {
        let view = TestView::new(4).bucket(1, &["a", "b"]).build();
        let provider = MemViewProvider::create(peer("b"), view.clone());

        assert_eq!(view, provider.current_view().await.unwrap());
        assert_eq!(peer("b"), provider.self_address());

        provider.set_unavailable();
        provider.current_view().await.unwrap_err();

        provider.set_view(view.clone());
        assert_eq!(view, provider.current_view().await.unwrap());
    }
}
