//! Scripted recognition engine for tests and engine-less runs.

use std::collections::VecDeque;
use std::time::Duration;

use confab_audio::Utterance;
use parking_lot::Mutex;

use crate::{Transcriber, TranscriptionError};

/// Replays a fixed sequence of results, one per call. When the script
/// runs out it reports an empty transcription.
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Result<String, TranscriptionError>>>,
    delay: Duration,
}

impl ScriptedTranscriber {
    pub fn new(results: Vec<Result<String, TranscriptionError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            delay: Duration::ZERO,
        }
    }

    /// Simulates engine latency by sleeping inside the blocking call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Transcriber for ScriptedTranscriber {
    fn transcribe(&self, utterance: &Utterance) -> Result<String, TranscriptionError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        tracing::debug!(
            samples = utterance.samples.len(),
            rate = utterance.sample_rate,
            "scripted transcribe"
        );
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Err(TranscriptionError::Empty))
    }
}
