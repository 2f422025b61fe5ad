use tokio::sync::watch;

/// Cooperative shutdown signal shared across tasks.
///
/// `trigger` is idempotent; `wait` resolves once for every clone after
/// the first trigger.
#[derive(Clone)]
pub struct ShutdownToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // The sender lives as long as any clone of self, so an error
        // here means every handle is gone and shutdown is moot.
        let _ = rx.changed().await;
    }
}
