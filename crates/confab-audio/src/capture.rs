use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::broadcast;

use confab_foundation::CaptureError;

use crate::frame::AudioFrame;

/// Negotiated input device parameters, fixed at session start.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: Option<String>,
    pub frame_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            frame_ms: 32,
        }
    }
}

/// Owner thread for the microphone device.
///
/// Frames are published on a broadcast channel; slow or absent
/// receivers drop frames rather than buffering them, which bounds
/// memory no matter what the rest of the pipeline is doing.
pub struct CaptureThread {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl CaptureThread {
    pub fn spawn(
        config: CaptureConfig,
        frame_tx: broadcast::Sender<AudioFrame>,
    ) -> Result<(Self, DeviceConfig), CaptureError> {
        let host = cpal::default_host();
        let device = match &config.device {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceNotFound {
                    name: Some(format!("{name}: {e}")),
                })?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound {
                    name: Some(name.clone()),
                })?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::DeviceNotFound { name: None })?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::FormatNotSupported {
                format: e.to_string(),
            })?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();
        let device_config = DeviceConfig {
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
        };
        let frame_size =
            (device_config.sample_rate as usize * config.frame_ms as usize / 1000).max(1);

        tracing::info!(
            rate = device_config.sample_rate,
            channels = device_config.channels,
            frame_size,
            "opening input device {:?}",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        // Stream construction happens on the owner thread because cpal
        // streams are not Send on every host.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();
        let handle = thread::Builder::new()
            .name("confab-capture".to_string())
            .spawn(move || {
                let mut assembler = FrameAssembler::new(
                    frame_size,
                    device_config.sample_rate,
                    device_config.channels,
                    frame_tx,
                );
                // A device error mid-session is fatal to capture: the
                // flag stops the owner thread, and dropping the stream
                // drops the frame sender with it, so every subscriber
                // sees the broadcast close.
                let failed = Arc::new(AtomicBool::new(false));
                let err_flag = failed.clone();
                let err_fn = move |e: cpal::StreamError| {
                    tracing::error!("input stream error: {e}");
                    err_flag.store(true, Ordering::SeqCst);
                };
                let build = match sample_format {
                    SampleFormat::I16 => device.build_input_stream(
                        &stream_config,
                        move |data: &[i16], _| assembler.push_i16(data),
                        err_fn,
                        None,
                    ),
                    SampleFormat::F32 => device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _| assembler.push_f32(data),
                        err_fn,
                        None,
                    ),
                    other => {
                        let _ = ready_tx.send(Err(CaptureError::FormatNotSupported {
                            format: format!("{other:?}"),
                        }));
                        return;
                    }
                };
                let stream = match build {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while thread_running.load(Ordering::SeqCst) {
                    if failed.load(Ordering::SeqCst) {
                        tracing::error!("input stream failed, closing capture");
                        break;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
                tracing::info!("capture thread stopped");
            })
            .map_err(|e| CaptureError::DeviceNotFound {
                name: Some(format!("spawn failed: {e}")),
            })?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok((
                Self {
                    handle: Some(handle),
                    running,
                },
                device_config,
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::NoDataTimeout {
                duration: Duration::from_secs(5),
            }),
        }
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Downmixes callback buffers to mono and cuts them into fixed-size
/// frames with a monotone sequence number.
struct FrameAssembler {
    frame_size: usize,
    sample_rate: u32,
    channels: u16,
    pending: Vec<i16>,
    seq: AtomicU64,
    tx: broadcast::Sender<AudioFrame>,
}

impl FrameAssembler {
    fn new(
        frame_size: usize,
        sample_rate: u32,
        channels: u16,
        tx: broadcast::Sender<AudioFrame>,
    ) -> Self {
        Self {
            frame_size,
            sample_rate,
            channels,
            pending: Vec::with_capacity(frame_size * 2),
            seq: AtomicU64::new(0),
            tx,
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        let channels = self.channels as usize;
        if channels <= 1 {
            self.pending.extend_from_slice(data);
        } else {
            for chunk in data.chunks_exact(channels) {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                self.pending.push((sum / channels as i32) as i16);
            }
        }
        self.flush_frames();
    }

    fn push_f32(&mut self, data: &[f32]) {
        let channels = self.channels as usize;
        if channels <= 1 {
            self.pending
                .extend(data.iter().map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16));
        } else {
            for chunk in data.chunks_exact(channels) {
                let mean = chunk.iter().sum::<f32>() / channels as f32;
                self.pending.push((mean.clamp(-1.0, 1.0) * 32767.0) as i16);
            }
        }
        self.flush_frames();
    }

    fn flush_frames(&mut self) {
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            let frame = AudioFrame {
                samples,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                sample_rate: self.sample_rate,
            };
            // send() only fails when there is no receiver at all; frames
            // are intentionally dropped in that case.
            let _ = self.tx.send(frame);
        }
    }
}
