//! Voice gate task: frame consumer feeding the orchestrator boundary
//! events.
//!
//! Runs independently of the orchestrator so gating keeps up with the
//! capture rate even while the coordination task is busy tearing a
//! reply down.

use tokio::sync::broadcast;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use confab_audio::AudioFrame;
use confab_vad::{GateEvent, VadConfig, VoiceActivityGate};

pub struct GateTask {
    gate: VoiceActivityGate,
    frames_rx: broadcast::Receiver<AudioFrame>,
    event_tx: Sender<GateEvent>,
    frames_processed: u64,
    events_emitted: u64,
}

impl GateTask {
    pub fn new(
        config: VadConfig,
        frames_rx: broadcast::Receiver<AudioFrame>,
        event_tx: Sender<GateEvent>,
    ) -> Self {
        Self {
            gate: VoiceActivityGate::new(config),
            frames_rx,
            event_tx,
            frames_processed: 0,
            events_emitted: 0,
        }
    }

    pub fn spawn(
        config: VadConfig,
        frames_rx: broadcast::Receiver<AudioFrame>,
        event_tx: Sender<GateEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(Self::new(config, frames_rx, event_tx).run())
    }

    pub async fn run(mut self) {
        info!("voice gate task started");

        loop {
            match self.frames_rx.recv().await {
                Ok(frame) => self.process_frame(&frame).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Dropped frames shift the gate's clock slightly;
                    // that only skews event timestamps, not edges.
                    warn!(dropped = n, "voice gate lagged behind capture");
                    self.gate.reset();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!(
            frames = self.frames_processed,
            events = self.events_emitted,
            "voice gate task stopped"
        );
    }

    async fn process_frame(&mut self, frame: &AudioFrame) {
        self.frames_processed += 1;

        if let Some(event) = self.gate.process(&frame.samples) {
            self.events_emitted += 1;
            debug!(?event, "utterance boundary");
            // A gone receiver is not an exit condition; frames keep
            // draining so the broadcast ring stays healthy.
            let _ = self.event_tx.send(event).await;
        }

        if self.frames_processed % 1000 == 0 {
            debug!(
                frames = self.frames_processed,
                events = self.events_emitted,
                state = ?self.gate.state(),
                "voice gate progress"
            );
        }
    }
}
