use tokio::task::AbortHandle;

/// Aborts a background task when dropped.
///
/// Modules that spawn tasks hold one of these per task so that dropping
/// the module stops its tasks.
#[derive(Debug)]
pub(crate) struct DropAbortHandle {
    pub(crate) name: &'static str,
    pub(crate) handle: AbortHandle,
}

impl Drop for DropAbortHandle {
    fn drop(&mut self) {
        tracing::info!("Aborting: {}", self.name);
        self.handle.abort();
    }
}
