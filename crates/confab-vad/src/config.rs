use serde::{Deserialize, Serialize};

/// Tunables for the energy gate. All durations are rounded up to
/// whole frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadConfig {
    /// Frames louder than this (dBFS) count as speech candidates.
    pub threshold_dbfs: f32,
    /// A Silence→Speech edge must hold this long before SpeechStart.
    pub onset_ms: u32,
    /// Trailing-silence tolerance before SpeechEnd. Prevents clipping
    /// the end of words on short pauses.
    pub hangover_ms: u32,
    /// Duration of one input frame.
    pub frame_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: -40.0,
            onset_ms: 150,
            hangover_ms: 600,
            frame_ms: 32,
        }
    }
}

impl VadConfig {
    pub fn onset_frames(&self) -> u32 {
        self.onset_ms.div_ceil(self.frame_ms).max(1)
    }

    pub fn hangover_frames(&self) -> u32 {
        self.hangover_ms.div_ceil(self.frame_ms).max(1)
    }
}
