//! Speech-recognition boundary.
//!
//! A recognition engine is a single blocking call from audio to text.
//! The orchestrator runs it on a worker task; no retry on failure,
//! the user simply speaks again.

pub mod scripted;

use confab_audio::Utterance;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscriptionError {
    /// The engine produced no text. No turn is appended for it.
    #[error("empty transcription")]
    Empty,

    #[error("recognition engine failure: {0}")]
    Engine(String),
}

/// Capability interface for speech recognition.
///
/// Input is a mono PCM blob plus its sample rate; output is UTF-8
/// text. Implementations may block for the duration of the call.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, utterance: &Utterance) -> Result<String, TranscriptionError>;
}
