use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use confab_foundation::PlaybackError;

use crate::frame::AudioBuffer;

/// How one `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The buffer drained in full.
    Completed,
    /// The buffer was truncated by `interrupt`.
    Interrupted,
}

/// Owner interface for the audio output device.
///
/// Buffers queued through `play` are rendered strictly in order.
/// `interrupt` applies a short fade to whatever is currently rendering
/// and discards everything queued behind it.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, buffer: AudioBuffer) -> Result<PlaybackOutcome, PlaybackError>;

    async fn interrupt(&self, fade: Duration);
}

struct PlayJob {
    samples: Vec<i16>,
    pos: usize,
    done: Option<oneshot::Sender<PlaybackOutcome>>,
}

struct SinkShared {
    jobs: VecDeque<PlayJob>,
    gain: f32,
    /// Per-sample gain decrement while fading out; 0.0 when steady.
    fade_step: f32,
}

impl SinkShared {
    fn flush(&mut self, outcome: PlaybackOutcome) {
        for mut job in self.jobs.drain(..) {
            if let Some(done) = job.done.take() {
                let _ = done.send(outcome);
            }
        }
        self.gain = 1.0;
        self.fade_step = 0.0;
    }

    /// Renders into an output slice, returning silence once drained.
    fn render(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            while self
                .jobs
                .front()
                .map(|j| j.pos >= j.samples.len())
                .unwrap_or(false)
            {
                let mut job = self.jobs.pop_front().expect("front checked");
                if let Some(done) = job.done.take() {
                    let _ = done.send(PlaybackOutcome::Completed);
                }
            }
            let gain = self.gain;
            let sample = match self.jobs.front_mut() {
                None => 0.0,
                Some(job) => {
                    let s = job.samples[job.pos] as f32 / 32768.0;
                    job.pos += 1;
                    s * gain
                }
            };
            *slot = sample;

            if self.fade_step > 0.0 {
                self.gain -= self.fade_step;
                if self.gain <= 0.0 {
                    self.flush(PlaybackOutcome::Interrupted);
                }
            }
        }
    }
}

/// Duplicates each mono sample across one interleaved output frame.
/// The callback slice need not be a whole number of frames.
fn fan_out(out: &mut [f32], mono: &[f32], channels: usize) {
    for (frame, &sample) in out.chunks_mut(channels).zip(mono) {
        frame.fill(sample);
    }
}

/// cpal-backed implementation of [`AudioSink`].
///
/// The output stream lives on its own thread; the async side only
/// touches the shared render queue.
pub struct CpalSink {
    shared: Arc<Mutex<SinkShared>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalSink {
    /// Opens the output device at the synthesis sample rate. An
    /// unsupported rate surfaces as a build error rather than being
    /// resampled.
    pub fn open(device: Option<&str>, sample_rate: u32) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = match device {
            Some(name) => host
                .output_devices()
                .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| PlaybackError::DeviceNotFound {
                    name: Some(name.to_string()),
                })?,
            None => host
                .default_output_device()
                .ok_or(PlaybackError::DeviceNotFound { name: None })?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::info!(
            rate = sample_rate,
            channels,
            "opening output device {:?}",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );

        let shared = Arc::new(Mutex::new(SinkShared {
            jobs: VecDeque::new(),
            gain: 1.0,
            fade_step: 0.0,
        }));
        let running = Arc::new(AtomicBool::new(true));

        let thread_shared = shared.clone();
        let thread_running = running.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), PlaybackError>>();
        let handle = thread::Builder::new()
            .name("confab-playback".to_string())
            .spawn(move || {
                if sample_format != SampleFormat::F32 {
                    let _ = ready_tx.send(Err(PlaybackError::DeviceUnavailable(format!(
                        "unsupported output format {sample_format:?}"
                    ))));
                    return;
                }
                let render_shared = thread_shared.clone();
                let channels = channels as usize;
                let mut mono = Vec::new();
                let stream = device.build_output_stream(
                    &stream_config,
                    move |out: &mut [f32], _| {
                        mono.resize(out.len().div_ceil(channels), 0.0);
                        render_shared.lock().render(&mut mono);
                        fan_out(out, &mono, channels);
                    },
                    |e| tracing::error!("output stream error: {e}"),
                    None,
                );
                let stream = match stream {
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
                    thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
                tracing::info!("playback thread stopped");
            })
            .map_err(|e| PlaybackError::DeviceUnavailable(format!("spawn failed: {e}")))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                shared,
                running,
                handle: Some(handle),
                sample_rate,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError::WorkerStopped),
        }
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, buffer: AudioBuffer) -> Result<PlaybackOutcome, PlaybackError> {
        if buffer.sample_rate != self.sample_rate {
            return Err(PlaybackError::DeviceUnavailable(format!(
                "buffer rate {} does not match sink rate {}",
                buffer.sample_rate, self.sample_rate
            )));
        }
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut shared = self.shared.lock();
            shared.jobs.push_back(PlayJob {
                samples: buffer.samples,
                pos: 0,
                done: Some(done_tx),
            });
        }
        done_rx.await.map_err(|_| PlaybackError::WorkerStopped)
    }

    async fn interrupt(&self, fade: Duration) {
        let mut shared = self.shared.lock();
        if shared.jobs.is_empty() {
            return;
        }
        let fade_samples = (fade.as_secs_f64() * self.sample_rate as f64) as usize;
        if fade_samples == 0 {
            shared.flush(PlaybackOutcome::Interrupted);
        } else {
            shared.fade_step = shared.gain / fade_samples as f32;
        }
    }
}
