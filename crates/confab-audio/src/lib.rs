//! Audio capture and playback for Confab.
//!
//! One thread owns the microphone device and one thread owns the
//! output device; nothing else touches the underlying handles.

pub mod capture;
pub mod frame;
pub mod playback;

pub use capture::{CaptureConfig, CaptureThread, DeviceConfig};
pub use frame::{AudioBuffer, AudioFrame, Utterance, UtteranceBuffer};
pub use playback::{AudioSink, CpalSink, PlaybackOutcome};
