use crate::config::VadConfig;
use crate::energy::EnergyMeter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Silence,
    Speech,
}

/// Utterance boundary events, emitted only after the corresponding
/// edge has held for the configured debounce duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateEvent {
    SpeechStart {
        timestamp_ms: u64,
        energy_dbfs: f32,
    },
    SpeechEnd {
        timestamp_ms: u64,
        duration_ms: u64,
        energy_dbfs: f32,
    },
}

/// Edge detector with onset debounce and hangover.
///
/// A SpeechStart is emitted once speech candidates hold for the full
/// onset window; a SpeechEnd once silence holds for the full hangover
/// window. Edges held exactly at the threshold fire.
pub struct VoiceActivityGate {
    config: VadConfig,
    state: GateState,
    speech_frames: u32,
    silence_frames: u32,
    frames_seen: u64,
    speech_started_at_ms: u64,
}

impl VoiceActivityGate {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: GateState::Silence,
            speech_frames: 0,
            silence_frames: 0,
            frames_seen: 0,
            speech_started_at_ms: 0,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = GateState::Silence;
        self.speech_frames = 0;
        self.silence_frames = 0;
    }

    pub fn process(&mut self, frame: &[i16]) -> Option<GateEvent> {
        let energy_dbfs = EnergyMeter::dbfs(frame);
        let is_speech = energy_dbfs > self.config.threshold_dbfs;
        self.frames_seen += 1;

        match self.state {
            GateState::Silence => {
                if is_speech {
                    self.speech_frames += 1;
                    if self.speech_frames >= self.config.onset_frames() {
                        self.state = GateState::Speech;
                        self.speech_frames = 0;
                        self.speech_started_at_ms = self.timestamp_ms();
                        return Some(GateEvent::SpeechStart {
                            timestamp_ms: self.speech_started_at_ms,
                            energy_dbfs,
                        });
                    }
                } else {
                    self.speech_frames = 0;
                }
            }
            GateState::Speech => {
                if is_speech {
                    self.silence_frames = 0;
                } else {
                    self.silence_frames += 1;
                    if self.silence_frames >= self.config.hangover_frames() {
                        self.state = GateState::Silence;
                        self.silence_frames = 0;
                        let now = self.timestamp_ms();
                        return Some(GateEvent::SpeechEnd {
                            timestamp_ms: now,
                            duration_ms: now.saturating_sub(self.speech_started_at_ms).max(1),
                            energy_dbfs,
                        });
                    }
                }
            }
        }
        None
    }

    fn timestamp_ms(&self) -> u64 {
        self.frames_seen * self.config.frame_ms as u64
    }
}
