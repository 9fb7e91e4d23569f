// Operator interrupt handle
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Shared flag raised by Ctrl-C (or by tests)
///
/// Clones observe the same flag. Nothing is cancelled implicitly: the
/// submitter checks the flag before broadcasting and while waiting.
#[derive(Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    /// A handle that is only raised explicitly
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// A handle raised when the process receives Ctrl-C
    pub fn ctrl_c() -> Self {
        let interrupt = Self::new();
        let handle = interrupt.clone();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received");
                handle.raise();
            }
        });

        interrupt
    }

    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        // the sender lives as long as any handle, so this only ends on raise
        let _ = rx.wait_for(|raised| *raised).await;
    }
}
