use tokio::sync::{mpsc, watch};

use crate::GenerationError;

/// Handle for one in-flight generation call.
///
/// The channel closing is the end-of-reply marker. Dropping the
/// handle cancels the stream, so resources are released on every exit
/// path.
pub struct GenerationStream {
    deltas: mpsc::Receiver<Result<String, GenerationError>>,
    cancel: watch::Sender<bool>,
}

impl GenerationStream {
    /// Creates a connected writer/stream pair. Engines keep the writer
    /// on their worker task.
    pub fn channel(capacity: usize) -> (StreamWriter, GenerationStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            StreamWriter { tx, cancel_rx },
            GenerationStream {
                deltas: rx,
                cancel: cancel_tx,
            },
        )
    }

    /// Next text delta, or `None` at end of reply.
    pub async fn next_delta(&mut self) -> Option<Result<String, GenerationError>> {
        self.deltas.recv().await
    }

    /// Idempotent, non-blocking. The engine side observes the flag and
    /// stops producing; the caller does not wait for acknowledgement.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Engine-side producer half of a [`GenerationStream`].
pub struct StreamWriter {
    tx: mpsc::Sender<Result<String, GenerationError>>,
    cancel_rx: watch::Receiver<bool>,
}

impl StreamWriter {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Sends one delta. Returns false once the stream is cancelled or
    /// the consumer is gone, at which point the engine should stop.
    pub async fn send(&self, delta: Result<String, GenerationError>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx.send(delta).await.is_ok()
    }
}
