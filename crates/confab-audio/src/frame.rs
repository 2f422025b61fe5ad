use std::time::Duration;

/// Fixed-duration block of mono PCM produced by the capture thread.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub seq: u64,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// A finished block of synthesized PCM handed to the playback sink.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// One bounded span of captured speech, ready for transcription.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Accumulates frames between a start and end boundary.
///
/// Owned exclusively by the orchestrator for the duration of one turn;
/// `close` consumes the buffer so a closed utterance cannot grow.
#[derive(Debug)]
pub struct UtteranceBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl UtteranceBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn push(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(&frame.samples);
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn close(self) -> Utterance {
        Utterance {
            samples: self.samples,
            sample_rate: self.sample_rate,
        }
    }
}
