/// Local handle to an in-flight operation.
///
/// Cancelling severs the local side only; the remote peer may keep working
/// until it notices the closed transport.
pub trait CancelHandle: Send {
    fn cancel(&self);
}

impl CancelHandle for tokio::task::AbortHandle {
    fn cancel(&self) {
        self.abort();
    }
}
