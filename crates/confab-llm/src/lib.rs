//! Language-model boundary.
//!
//! A generation engine turns an ordered transcript into a lazy,
//! finite, cancellable sequence of text deltas. At most one stream is
//! open per session; the orchestrator enforces that.

pub mod scripted;
pub mod stream;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use stream::{GenerationStream, StreamWriter};

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("generation engine failure: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One transcript entry as seen by the engine. Ordering matters for
/// model context; callers never reorder or deduplicate.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// Sampling configuration, fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 1.0,
            top_k: 40,
            repetition_penalty: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Model loading configuration, fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub model_path: std::path::PathBuf,
    pub context_window: u32,
    pub gpu_layers: u32,
}

/// Capability interface for text generation.
///
/// `open_stream` returns immediately; deltas arrive lazily on the
/// stream handle and stop flowing shortly after cancellation.
pub trait LanguageModel: Send + Sync {
    fn open_stream(&self, transcript: &[ChatTurn]) -> Result<GenerationStream, GenerationError>;
}
