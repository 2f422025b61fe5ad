//! Voice activity gate for Confab.
//!
//! Classifies fixed-size PCM frames as speech or silence and reports
//! utterance boundaries after debouncing. Bypassed entirely in
//! push-to-talk mode, where boundaries come from key events.

pub mod config;
pub mod energy;
pub mod gate;

pub use config::VadConfig;
pub use energy::EnergyMeter;
pub use gate::{GateEvent, GateState, VoiceActivityGate};
