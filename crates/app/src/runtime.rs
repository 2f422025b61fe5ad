//! Wires capture, the voice gate, the engines and the orchestrator
//! into a running app, and owns their lifetimes.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use confab_audio::{AudioSink, CaptureConfig, CaptureThread, CpalSink};
use confab_foundation::{AppError, ShutdownToken};
use confab_llm::scripted::ScriptedModel;
use confab_llm::LanguageModel;
use confab_stt::scripted::ScriptedTranscriber;
use confab_stt::Transcriber;
use confab_tts::scripted::SilenceSynthesizer;
use confab_tts::{SynthesisOptions, Synthesizer};

use crate::config::AppConfig;
use crate::gate_task::GateTask;
use crate::orchestrator::Orchestrator;
use crate::ui::{UiCommand, UiEvent};

const FRAME_CHANNEL: usize = 256;
const COMMAND_CHANNEL: usize = 64;
const EVENT_CHANNEL: usize = 256;
const GATE_CHANNEL: usize = 64;

/// Engine set handed to the orchestrator. The scripted stand-ins are
/// the in-tree default; real engines slot in behind the same traits.
pub struct Engines {
    pub transcriber: Arc<dyn Transcriber>,
    pub model: Arc<dyn LanguageModel>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Engines {
    /// Scripted engines: transcription reports empty, generation
    /// echoes the user text. Keeps the whole pipeline exercisable
    /// without model weights on disk.
    pub fn scripted(sample_rate: u32) -> Self {
        Self {
            transcriber: Arc::new(ScriptedTranscriber::new(Vec::new())),
            model: Arc::new(ScriptedModel::new(Vec::new())),
            synthesizer: Arc::new(SilenceSynthesizer::new(sample_rate)),
        }
    }
}

/// Handle over the running pipeline. Dropping it tears everything
/// down; `shutdown` does so in order and waits for the orchestrator.
pub struct AppHandle {
    commands: mpsc::Sender<UiCommand>,
    events: broadcast::Sender<UiEvent>,
    orchestrator: JoinHandle<()>,
    gate: JoinHandle<()>,
    capture: CaptureThread,
    shutdown: ShutdownToken,
    pub capture_rate: u32,
}

impl AppHandle {
    pub async fn start(config: &AppConfig) -> Result<Self, AppError> {
        let sink: Arc<dyn AudioSink> = Arc::new(
            CpalSink::open(config.audio.output_device.as_deref(), config.tts.sample_rate)
                .map_err(AppError::Playback)?,
        );
        let engines = Engines::scripted(config.tts.sample_rate);
        if config.llm.model_path.is_some() {
            warn!("llm.model_path is set but no inference engine is linked in; using the scripted model");
        }
        Self::start_with(config, engines, sink).await
    }

    /// Same wiring with injected engines and sink.
    pub async fn start_with(
        config: &AppConfig,
        engines: Engines,
        sink: Arc<dyn AudioSink>,
    ) -> Result<Self, AppError> {
        let (frames_tx, _) = broadcast::channel(FRAME_CHANNEL);
        let (capture, device) = CaptureThread::spawn(
            CaptureConfig {
                device: config.audio.input_device.clone(),
                frame_ms: config.audio.frame_ms,
            },
            frames_tx.clone(),
        )
        .map_err(AppError::Capture)?;
        info!(
            rate = device.sample_rate,
            channels = device.channels,
            "capture running"
        );

        let (gate_tx, gate_rx) = mpsc::channel(GATE_CHANNEL);
        let gate = GateTask::spawn(config.vad_config(), frames_tx.subscribe(), gate_tx);

        let (commands, commands_rx) = mpsc::channel(COMMAND_CHANNEL);
        let (events, _) = broadcast::channel(EVENT_CHANNEL);

        let synthesis = SynthesisOptions {
            voice: config.tts.voice.clone(),
            speed: config.tts.speed,
        };
        let orchestrator = Orchestrator::new(
            config.orchestrator_config(),
            config.mode().map_err(|e| AppError::Config(e.to_string()))?,
            device.sample_rate,
            frames_tx.subscribe(),
            gate_rx,
            commands_rx,
            events.clone(),
            engines.transcriber,
            engines.model,
            engines.synthesizer,
            sink,
            config
                .system_prompt()
                .map_err(|e| AppError::Config(e.to_string()))?,
            synthesis,
        )
        .spawn();

        let shutdown = ShutdownToken::new();
        {
            // Ctrl-C outside the TUI (raw mode swallows it inside)
            // becomes a regular Exit command.
            let token = shutdown.clone();
            let commands = commands.clone();
            tokio::spawn(async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            info!("interrupt signal received");
                            token.trigger();
                            let _ = commands.send(UiCommand::Exit).await;
                        }
                    }
                    _ = token.wait() => {}
                }
            });
        }

        Ok(Self {
            commands,
            events,
            orchestrator,
            gate,
            capture,
            shutdown,
            capture_rate: device.sample_rate,
        })
    }

    pub fn commands(&self) -> mpsc::Sender<UiCommand> {
        self.commands.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// Orderly teardown: ask the orchestrator to exit, then stop the
    /// device threads.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        let _ = self.commands.send(UiCommand::Exit).await;
        if let Err(e) = self.orchestrator.await {
            warn!("orchestrator task failed during shutdown: {e}");
        }
        self.capture.stop();
        // The gate exits once the capture broadcast closes.
        let _ = self.gate.await;
        info!("app runtime stopped");
    }
}
