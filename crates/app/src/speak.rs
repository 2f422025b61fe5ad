//! Synthesis→playback worker for one assistant reply.
//!
//! Consumes sentence chunks from a bounded queue while generation is
//! still running; the queue bound is what throttles the inference
//! engine instead of buffering unbounded text. Chunks are synthesized
//! and played strictly in the order they were formed.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use confab_audio::{AudioSink, PlaybackOutcome};
use confab_foundation::PlaybackError;
use confab_tts::{SynthesisOptions, Synthesizer};

use crate::ui::UiEvent;

#[derive(Debug, Default)]
pub struct SpeakOutcome {
    pub chunks_spoken: u64,
    pub interrupted: bool,
    pub playback_error: Option<PlaybackError>,
}

pub struct SpeakWorker {
    pub handle: JoinHandle<SpeakOutcome>,
    pub cancel: watch::Sender<bool>,
}

impl SpeakWorker {
    pub fn spawn(
        chunk_rx: mpsc::Receiver<String>,
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        options: SynthesisOptions,
        events_tx: broadcast::Sender<UiEvent>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run(chunk_rx, synthesizer, sink, options, events_tx, cancel_rx));
        Self {
            handle,
            cancel: cancel_tx,
        }
    }
}

async fn run(
    mut chunk_rx: mpsc::Receiver<String>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    options: SynthesisOptions,
    events_tx: broadcast::Sender<UiEvent>,
    mut cancel: watch::Receiver<bool>,
) -> SpeakOutcome {
    let mut outcome = SpeakOutcome::default();

    'chunks: while let Some(chunk) = chunk_rx.recv().await {
        if *cancel.borrow_and_update() {
            outcome.interrupted = true;
            break;
        }

        debug!(len = chunk.len(), "synthesizing chunk");
        let synth = synthesizer.clone();
        let opts = options.clone();
        let text = chunk.clone();
        let buffers =
            match tokio::task::spawn_blocking(move || synth.synthesize(&text, &opts)).await {
                Ok(Ok(buffers)) => buffers,
                Ok(Err(e)) => {
                    // A failed chunk is skipped; later chunks continue.
                    warn!("synthesis failed, skipping chunk: {e}");
                    let _ = events_tx.send(UiEvent::Notice(format!("Synthesis failed: {e}")));
                    continue;
                }
                Err(e) => {
                    warn!("synthesis worker panicked: {e}");
                    continue;
                }
            };

        for buffer in buffers {
            if *cancel.borrow_and_update() {
                outcome.interrupted = true;
                break 'chunks;
            }
            tokio::select! {
                result = sink.play(buffer) => match result {
                    Ok(PlaybackOutcome::Completed) => {}
                    Ok(PlaybackOutcome::Interrupted) => {
                        outcome.interrupted = true;
                        break 'chunks;
                    }
                    Err(e) => {
                        outcome.playback_error = Some(e);
                        break 'chunks;
                    }
                },
                _ = cancel.changed() => {
                    // The orchestrator interrupts the sink itself; a
                    // second zero-fade interrupt here just covers a
                    // buffer enqueued after that flush.
                    sink.interrupt(std::time::Duration::ZERO).await;
                    outcome.interrupted = true;
                    break 'chunks;
                }
            }
        }
        outcome.chunks_spoken += 1;
    }

    debug!(
        chunks = outcome.chunks_spoken,
        interrupted = outcome.interrupted,
        "speak worker finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use confab_audio::AudioBuffer;
    use confab_tts::scripted::SilenceSynthesizer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSink {
        plays: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for CountingSink {
        async fn play(&self, _buffer: AudioBuffer) -> Result<PlaybackOutcome, PlaybackError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(PlaybackOutcome::Completed)
        }

        async fn interrupt(&self, _fade: Duration) {}
    }

    fn worker(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<CountingSink>,
    ) -> (mpsc::Sender<String>, SpeakWorker, broadcast::Receiver<UiEvent>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(2);
        let (events_tx, events_rx) = broadcast::channel(32);
        let w = SpeakWorker::spawn(
            chunk_rx,
            synthesizer,
            sink,
            SynthesisOptions::default(),
            events_tx,
        );
        (chunk_tx, w, events_rx)
    }

    #[tokio::test]
    async fn failed_chunk_is_skipped_and_later_chunks_continue() {
        let synth = Arc::new(
            SilenceSynthesizer::new(24_000)
                .with_per_char(Duration::from_millis(1))
                .failing_on("XX"),
        );
        let sink = Arc::new(CountingSink {
            plays: AtomicUsize::new(0),
        });
        let (chunk_tx, w, mut events_rx) = worker(synth, sink.clone());

        chunk_tx.send("first chunk.".into()).await.unwrap();
        chunk_tx.send("bad XX chunk.".into()).await.unwrap();
        chunk_tx.send("last chunk.".into()).await.unwrap();
        drop(chunk_tx);

        let outcome = w.handle.await.unwrap();
        assert_eq!(outcome.chunks_spoken, 2);
        assert!(!outcome.interrupted);
        assert!(sink.plays.load(Ordering::SeqCst) >= 2);

        // The failure surfaced as a notice.
        let mut saw_notice = false;
        while let Ok(event) = events_rx.try_recv() {
            if matches!(&event, UiEvent::Notice(n) if n.contains("Synthesis failed")) {
                saw_notice = true;
            }
        }
        assert!(saw_notice);
    }

    #[tokio::test]
    async fn cancel_between_chunks_stops_the_worker() {
        let synth =
            Arc::new(SilenceSynthesizer::new(24_000).with_per_char(Duration::from_millis(1)));
        let sink = Arc::new(CountingSink {
            plays: AtomicUsize::new(0),
        });
        let (chunk_tx, w, _events_rx) = worker(synth, sink);

        // Cancel lands before the chunk so the worker must observe it
        // on receipt.
        w.cancel.send(true).unwrap();
        chunk_tx.send("queued but never spoken.".into()).await.unwrap();

        let outcome = w.handle.await.unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.chunks_spoken, 0);
        drop(chunk_tx);
    }
}
