//! Scripted synthesis engine for tests and engine-less runs.

use std::time::Duration;

use confab_audio::AudioBuffer;

use crate::{SynthesisError, SynthesisOptions, Synthesizer};

/// Produces silence proportional to the text length, so pipeline
/// timing behaves like a real engine without one installed.
pub struct SilenceSynthesizer {
    sample_rate: u32,
    per_char: Duration,
    fail_on: Option<String>,
}

impl SilenceSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            per_char: Duration::from_millis(40),
            fail_on: None,
        }
    }

    pub fn with_per_char(mut self, per_char: Duration) -> Self {
        self.per_char = per_char;
        self
    }

    /// Fails any chunk containing the marker, for skip-and-continue
    /// tests.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }
}

impl Synthesizer for SilenceSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Vec<AudioBuffer>, SynthesisError> {
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(SynthesisError::Engine(format!(
                    "scripted failure on {marker:?}"
                )));
            }
        }
        let seconds = text.chars().count() as f64 * self.per_char.as_secs_f64()
            / options.speed.max(0.1) as f64;
        let total = (seconds * self.sample_rate as f64) as usize;
        tracing::debug!(chars = text.chars().count(), total, "scripted synthesis");

        // Split into ~250ms buffers so playback remains interruptible
        // at buffer granularity.
        let buffer_len = (self.sample_rate as usize / 4).max(1);
        let mut buffers = Vec::new();
        let mut remaining = total.max(1);
        while remaining > 0 {
            let len = remaining.min(buffer_len);
            buffers.push(AudioBuffer {
                samples: vec![0; len],
                sample_rate: self.sample_rate,
            });
            remaining -= len;
        }
        Ok(buffers)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
