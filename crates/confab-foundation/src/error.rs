use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Audio playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

/// Errors from the microphone side. Failure to open the device is
/// fatal at startup; everything after that is reported per frame.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Input device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Input device disconnected")]
    DeviceDisconnected,

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("No audio data for {duration:?}")]
    NoDataTimeout { duration: Duration },

    #[error("CPAL error: {0}")]
    Cpal(#[from] cpal::StreamError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Supported stream configs error: {0}")]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),
}

/// Errors from the output side. Terminal for the current turn, never
/// retried automatically.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Output device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Output device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Playback worker stopped")]
    WorkerStopped,
}
