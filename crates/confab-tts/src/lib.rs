//! Speech-synthesis boundary.
//!
//! A synthesis engine turns one sentence-sized text chunk into a
//! finite ordered sequence of PCM buffers at a fixed sample rate.
//! Voice-blend signal processing happens behind this boundary; the
//! orchestrator only passes the selection through.

pub mod scripted;

use confab_audio::AudioBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesis engine failure: {0}")]
    Engine(String),

    #[error("unknown voice: {0}")]
    UnknownVoice(String),
}

/// A single named voice or a weighted blend of two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoiceSelection {
    Single { voice: String },
    Blend {
        primary: String,
        secondary: String,
        /// Weight of the primary voice, 0.0..=1.0.
        ratio: f32,
    },
}

impl Default for VoiceSelection {
    fn default() -> Self {
        Self::Single {
            voice: "af_sarah".to_string(),
        }
    }
}

/// Per-chunk synthesis options.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub voice: VoiceSelection,
    /// Playback speed multiplier; 1.0 is the voice's natural rate.
    pub speed: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            voice: VoiceSelection::default(),
            speed: 0.9,
        }
    }
}

/// Capability interface for speech synthesis. May block for the
/// duration of the call; the orchestrator runs it on a worker task.
pub trait Synthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Vec<AudioBuffer>, SynthesisError>;

    /// Output rate shared by every buffer this engine produces.
    fn sample_rate(&self) -> u32;
}
