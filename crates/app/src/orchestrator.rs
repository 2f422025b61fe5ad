//! Conversation orchestrator: the state machine and concurrency glue
//! driving capture, the voice gate, transcription, generation,
//! synthesis and playback as mutually cancellable stages.
//!
//! The coordination task never blocks on adapter I/O itself. Blocking
//! calls run on worker tasks; the loop waits on their completion
//! signals with bounded timeouts so a hung engine cannot freeze the
//! UI.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use confab_audio::{AudioFrame, AudioSink, UtteranceBuffer};
use confab_llm::{GenerationStream, LanguageModel};
use confab_stt::{Transcriber, TranscriptionError};
use confab_tts::{SynthesisOptions, Synthesizer};
use confab_vad::GateEvent;

use crate::chunker::SentenceChunker;
use crate::session::{ConversationState, Mode, Session, TurnId};
use crate::speak::{SpeakOutcome, SpeakWorker};
use crate::ui::{UiCommand, UiEvent};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Utterances shorter than this never reach transcription.
    pub min_utterance: Duration,
    /// Progress bound between generation deltas.
    pub generation_timeout: Duration,
    /// Bound on the blocking transcription call.
    pub transcription_timeout: Duration,
    /// Bound on waiting for worker teardown during cancellation.
    pub cancel_timeout: Duration,
    /// Fade applied to the in-flight buffer on barge-in.
    pub fade: Duration,
    /// Bounded queue between chunking and synthesis. Keeping this
    /// small throttles the inference engine instead of buffering
    /// unbounded text.
    pub chunk_queue: usize,
    /// Size cap closing a chunk when no punctuation shows up.
    pub chunk_max_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_utterance: Duration::from_millis(300),
            generation_timeout: Duration::from_secs(30),
            transcription_timeout: Duration::from_secs(30),
            cancel_timeout: Duration::from_secs(2),
            fade: Duration::from_millis(50),
            chunk_queue: 2,
            chunk_max_chars: 200,
        }
    }
}

/// What the coordination task is currently driving. Exactly one
/// variant is live at a time; barge-in teardown happens inside the
/// transition, so a new stage never starts before the previous one is
/// released.
enum Activity {
    Idle,
    Listening(UtteranceBuffer),
    Transcribing(JoinHandle<Result<String, TranscriptionError>>),
    Replying(Box<Reply>),
    Stopped,
}

/// One in-flight assistant reply: the generation stream plus the
/// pipelined synthesis/playback worker.
struct Reply {
    turn_id: TurnId,
    stream: Option<GenerationStream>,
    chunker: SentenceChunker,
    /// Chunks formed but not yet accepted by the bounded queue.
    ready: VecDeque<String>,
    chunk_tx: Option<mpsc::Sender<String>>,
    handle: JoinHandle<SpeakOutcome>,
    cancel: watch::Sender<bool>,
    speaking: bool,
    deadline: Instant,
}

pub struct Orchestrator {
    cfg: OrchestratorConfig,
    session: Session,
    frames_rx: broadcast::Receiver<AudioFrame>,
    gate_rx: mpsc::Receiver<GateEvent>,
    commands_rx: mpsc::Receiver<UiCommand>,
    events_tx: broadcast::Sender<UiEvent>,
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn LanguageModel>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    capture_rate: u32,
    system_prompt: Option<String>,
    synthesis: SynthesisOptions,
    pending_mode: Option<Mode>,
    gate_closed: bool,
}

#[allow(clippy::too_many_arguments)]
impl Orchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        mode: Mode,
        capture_rate: u32,
        frames_rx: broadcast::Receiver<AudioFrame>,
        gate_rx: mpsc::Receiver<GateEvent>,
        commands_rx: mpsc::Receiver<UiCommand>,
        events_tx: broadcast::Sender<UiEvent>,
        transcriber: Arc<dyn Transcriber>,
        model: Arc<dyn LanguageModel>,
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        system_prompt: Option<String>,
        synthesis: SynthesisOptions,
    ) -> Self {
        Self {
            cfg,
            session: Session::new(mode),
            frames_rx,
            gate_rx,
            commands_rx,
            events_tx,
            transcriber,
            model,
            synthesizer,
            sink,
            capture_rate,
            system_prompt,
            synthesis,
            pending_mode: None,
            gate_closed: false,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("conversation orchestrator started");
        self.emit(UiEvent::ModeChanged(self.session.mode()));
        self.emit(UiEvent::StateChanged(ConversationState::Idle));
        self.emit_notice("Ready to chat");

        let mut activity = Activity::Idle;
        loop {
            activity = match activity {
                Activity::Idle => self.step_idle().await,
                Activity::Listening(buffer) => self.step_listening(buffer).await,
                Activity::Transcribing(handle) => self.step_transcribing(handle).await,
                Activity::Replying(reply) => self.step_replying(*reply).await,
                Activity::Stopped => break,
            };
        }
        info!("conversation orchestrator stopped");
    }

    async fn step_idle(&mut self) -> Activity {
        if let Some(mode) = self.pending_mode.take() {
            self.apply_mode(mode);
        }
        self.set_state(ConversationState::Idle);

        loop {
            tokio::select! {
                cmd = self.commands_rx.recv() => {
                    let Some(cmd) = cmd else { return Activity::Stopped };
                    match cmd {
                        UiCommand::Exit => return Activity::Stopped,
                        UiCommand::SetMode(mode) => self.apply_mode(mode),
                        UiCommand::PttDown if self.session.mode() == Mode::PushToTalk => {
                            return self.begin_listening();
                        }
                        UiCommand::ClearHistory => {
                            self.session.clear();
                            self.emit(UiEvent::TranscriptCleared);
                            self.emit_notice("Transcript cleared");
                        }
                        UiCommand::RedoLast => {
                            if let Some(text) = self.session.pop_last_exchange() {
                                self.emit(UiEvent::TranscriptReset(self.session.turns().to_vec()));
                                return self.begin_reply(text);
                            }
                            self.emit_notice("Nothing to redo");
                        }
                        _ => {}
                    }
                }
                event = self.gate_rx.recv(), if !self.gate_closed => {
                    match event {
                        Some(GateEvent::SpeechStart { .. })
                            if self.session.mode() == Mode::Passive =>
                        {
                            return self.begin_listening();
                        }
                        None => self.gate_closed = true,
                        _ => {}
                    }
                }
            }
        }
    }

    async fn step_listening(&mut self, mut buffer: UtteranceBuffer) -> Activity {
        loop {
            tokio::select! {
                frame = self.frames_rx.recv() => {
                    match frame {
                        Ok(frame) => buffer.push(&frame),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(dropped = n, "frame consumer lagged while listening");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            self.emit_notice("Audio capture stopped");
                            return Activity::Stopped;
                        }
                    }
                }
                cmd = self.commands_rx.recv() => {
                    let Some(cmd) = cmd else { return Activity::Stopped };
                    match cmd {
                        UiCommand::Exit => return Activity::Stopped,
                        UiCommand::PttUp if self.session.mode() == Mode::PushToTalk => {
                            return self.finish_listening(buffer);
                        }
                        UiCommand::Interrupt => {
                            self.emit_notice("Utterance discarded");
                            return Activity::Idle;
                        }
                        UiCommand::SetMode(mode) => self.queue_mode(mode),
                        _ => {}
                    }
                }
                event = self.gate_rx.recv(), if !self.gate_closed => {
                    match event {
                        Some(GateEvent::SpeechEnd { .. })
                            if self.session.mode() == Mode::Passive =>
                        {
                            return self.finish_listening(buffer);
                        }
                        None => self.gate_closed = true,
                        _ => {}
                    }
                }
            }
        }
    }

    fn begin_listening(&mut self) -> Activity {
        // A fresh receiver skips frames broadcast before this instant;
        // idle-time frames are dropped, not buffered.
        self.frames_rx = self.frames_rx.resubscribe();
        self.set_state(ConversationState::Listening);
        self.emit_notice("Listening…");
        Activity::Listening(UtteranceBuffer::new(self.capture_rate))
    }

    fn finish_listening(&mut self, buffer: UtteranceBuffer) -> Activity {
        if buffer.duration() < self.cfg.min_utterance {
            // Spurious noise, not an error: silently back to Idle.
            debug!(duration = ?buffer.duration(), "utterance below minimum, discarded");
            return Activity::Idle;
        }
        let utterance = buffer.close();
        let transcriber = self.transcriber.clone();
        let handle = tokio::task::spawn_blocking(move || transcriber.transcribe(&utterance));
        self.set_state(ConversationState::Transcribing);
        self.emit_notice("Transcribing…");
        Activity::Transcribing(handle)
    }

    async fn step_transcribing(
        &mut self,
        mut handle: JoinHandle<Result<String, TranscriptionError>>,
    ) -> Activity {
        let deadline = Instant::now() + self.cfg.transcription_timeout;
        loop {
            tokio::select! {
                result = &mut handle => {
                    return match result {
                        Ok(Ok(text)) if !text.trim().is_empty() => {
                            self.begin_reply(text.trim().to_string())
                        }
                        Ok(Ok(_)) | Ok(Err(TranscriptionError::Empty)) => {
                            self.emit_notice("Heard nothing");
                            Activity::Idle
                        }
                        Ok(Err(e)) => {
                            self.emit_notice(&format!("Transcription failed: {e}"));
                            Activity::Idle
                        }
                        Err(e) => {
                            self.emit_notice(&format!("Transcription task failed: {e}"));
                            Activity::Idle
                        }
                    };
                }
                _ = tokio::time::sleep_until(deadline) => {
                    handle.abort();
                    self.emit_notice("Transcription timed out");
                    return Activity::Idle;
                }
                cmd = self.commands_rx.recv() => {
                    let Some(cmd) = cmd else { return Activity::Stopped };
                    match cmd {
                        UiCommand::Exit => {
                            handle.abort();
                            return Activity::Stopped;
                        }
                        UiCommand::SetMode(mode) => self.queue_mode(mode),
                        _ => {}
                    }
                }
                event = self.gate_rx.recv(), if !self.gate_closed => {
                    // Stale boundary events are drained so they cannot
                    // trigger a turn later.
                    if event.is_none() {
                        self.gate_closed = true;
                    }
                }
            }
        }
    }

    /// Appends the user turn and opens the generation stream plus the
    /// speak worker for the assistant reply.
    fn begin_reply(&mut self, user_text: String) -> Activity {
        let user = self.session.append_user(user_text);
        self.emit(UiEvent::TurnAppended(user));
        let transcript = self.session.chat_transcript(self.system_prompt.as_deref());
        self.set_state(ConversationState::Generating);
        self.emit_notice("Thinking…");

        let stream = match self.model.open_stream(&transcript) {
            Ok(stream) => stream,
            Err(e) => {
                self.emit_notice(&format!("Generation failed: {e}"));
                return Activity::Idle;
            }
        };

        let assistant = self.session.begin_assistant();
        let turn_id = assistant.id;
        self.emit(UiEvent::TurnAppended(assistant));

        let (chunk_tx, chunk_rx) = mpsc::channel(self.cfg.chunk_queue);
        let worker = SpeakWorker::spawn(
            chunk_rx,
            self.synthesizer.clone(),
            self.sink.clone(),
            self.synthesis.clone(),
            self.events_tx.clone(),
        );

        Activity::Replying(Box::new(Reply {
            turn_id,
            stream: Some(stream),
            chunker: SentenceChunker::new(self.cfg.chunk_max_chars),
            ready: VecDeque::new(),
            chunk_tx: Some(chunk_tx),
            handle: worker.handle,
            cancel: worker.cancel,
            speaking: false,
            deadline: Instant::now() + self.cfg.generation_timeout,
        }))
    }

    async fn step_replying(&mut self, reply: Reply) -> Activity {
        let Reply {
            turn_id,
            mut stream,
            mut chunker,
            mut ready,
            mut chunk_tx,
            mut handle,
            cancel,
            mut speaking,
            mut deadline,
        } = reply;

        loop {
            // Generation done and every chunk handed over: closing the
            // queue lets the speak worker finish after draining.
            if stream.is_none() && ready.is_empty() && chunk_tx.is_some() {
                chunk_tx = None;
            }

            tokio::select! {
                cmd = self.commands_rx.recv() => {
                    let Some(cmd) = cmd else {
                        self.cancel_reply(turn_id, stream.take(), chunk_tx.take(), &cancel, &mut handle).await;
                        return Activity::Stopped;
                    };
                    match cmd {
                        UiCommand::Exit => {
                            self.cancel_reply(turn_id, stream.take(), chunk_tx.take(), &cancel, &mut handle).await;
                            return Activity::Stopped;
                        }
                        UiCommand::PttDown if self.session.mode() == Mode::PushToTalk => {
                            // Barge-in: teardown plus re-arming is one
                            // transition; the UI only sees the completed
                            // turn and the new Listening state.
                            self.cancel_reply(turn_id, stream.take(), chunk_tx.take(), &cancel, &mut handle).await;
                            return self.begin_listening();
                        }
                        UiCommand::Interrupt => {
                            self.cancel_reply(turn_id, stream.take(), chunk_tx.take(), &cancel, &mut handle).await;
                            self.emit_notice("Interrupted");
                            return Activity::Idle;
                        }
                        UiCommand::SetMode(mode) => self.queue_mode(mode),
                        _ => {}
                    }
                }
                event = self.gate_rx.recv(), if !self.gate_closed => {
                    match event {
                        Some(GateEvent::SpeechStart { .. })
                            if self.session.mode() == Mode::Passive =>
                        {
                            self.cancel_reply(turn_id, stream.take(), chunk_tx.take(), &cancel, &mut handle).await;
                            return self.begin_listening();
                        }
                        None => self.gate_closed = true,
                        _ => {}
                    }
                }
                delta = async { stream.as_mut().expect("guarded").next_delta().await },
                    if stream.is_some() && ready.is_empty() =>
                {
                    match delta {
                        Some(Ok(delta)) => {
                            deadline = Instant::now() + self.cfg.generation_timeout;
                            if let Some(text) = self.session.append_assistant_text(turn_id, &delta) {
                                self.emit(UiEvent::TurnUpdated { id: turn_id, text });
                            }
                            ready.extend(chunker.push(&delta));
                        }
                        Some(Err(e)) => {
                            // Partial text already spoken is kept; the
                            // turn completes with what we have.
                            self.emit_notice(&format!("Generation failed: {e}"));
                            ready.extend(chunker.flush());
                            stream = None;
                        }
                        None => {
                            ready.extend(chunker.flush());
                            stream = None;
                        }
                    }
                }
                // An owned permit so the queue borrow does not outlive
                // this arm; the other arms move `chunk_tx` away.
                permit = async { chunk_tx.as_ref().expect("guarded").clone().reserve_owned().await },
                    if chunk_tx.is_some() && !ready.is_empty() =>
                {
                    match permit {
                        Ok(permit) => {
                            let chunk = ready.pop_front().expect("ready non-empty");
                            debug!(len = chunk.len(), "chunk queued for synthesis");
                            permit.send(chunk);
                            if !speaking {
                                speaking = true;
                                self.set_state(ConversationState::Speaking);
                            }
                            if ready.is_empty() && stream.is_some() {
                                // Delta pulls resume now; the progress
                                // clock must not count the time they
                                // were paused against the engine.
                                deadline = Instant::now() + self.cfg.generation_timeout;
                            }
                        }
                        Err(_) => {
                            // Worker gone; its outcome arrives on the
                            // join handle next iteration.
                            chunk_tx = None;
                            ready.clear();
                        }
                    }
                }
                outcome = &mut handle => {
                    return self.finish_reply(turn_id, stream.take(), outcome);
                }
                _ = tokio::time::sleep_until(deadline), if stream.is_some() && ready.is_empty() => {
                    self.emit_notice("Generation timed out");
                    ready.extend(chunker.flush());
                    if let Some(stream) = stream.take() {
                        stream.cancel();
                    }
                }
            }
        }
    }

    /// Natural end of a reply: the speak worker drained the queue (or
    /// died); the assistant turn completes with exactly the text
    /// generated.
    fn finish_reply(
        &mut self,
        turn_id: TurnId,
        stream: Option<GenerationStream>,
        outcome: Result<SpeakOutcome, JoinError>,
    ) -> Activity {
        if let Some(stream) = stream {
            stream.cancel();
        }
        match outcome {
            Ok(outcome) => {
                if let Some(e) = outcome.playback_error {
                    self.emit_notice(&format!("Playback failed: {e}"));
                }
            }
            Err(e) => self.emit_notice(&format!("Speech worker failed: {e}")),
        }
        if let Some(turn) = self.session.complete_turn(turn_id) {
            self.emit(UiEvent::TurnCompleted(turn));
        }
        self.emit_notice("Ready to chat");
        Activity::Idle
    }

    /// Cancels the in-flight reply: generation stream, chunk queue and
    /// playback, waiting no longer than the configured bound. The
    /// partial assistant turn is completed before the caller emits the
    /// next state change, so the two appear as one transition.
    async fn cancel_reply(
        &mut self,
        turn_id: TurnId,
        stream: Option<GenerationStream>,
        chunk_tx: Option<mpsc::Sender<String>>,
        cancel: &watch::Sender<bool>,
        handle: &mut JoinHandle<SpeakOutcome>,
    ) {
        self.set_state(ConversationState::Cancelling);
        if let Some(stream) = stream {
            // Idempotent and non-blocking; the engine side winds down
            // on its own without acknowledgement.
            stream.cancel();
        }
        drop(chunk_tx);
        let _ = cancel.send(true);
        self.sink.interrupt(self.cfg.fade).await;

        if tokio::time::timeout(self.cfg.cancel_timeout, &mut *handle)
            .await
            .is_err()
        {
            warn!("speak worker did not stop within the cancel bound");
            handle.abort();
        }

        if let Some(turn) = self.session.complete_turn(turn_id) {
            self.emit(UiEvent::TurnCompleted(turn));
        }
    }

    fn apply_mode(&mut self, mode: Mode) {
        if self.session.mode() != mode {
            self.session.set_mode(mode);
            info!(?mode, "conversation mode switched");
            self.emit(UiEvent::ModeChanged(mode));
        }
    }

    /// Mode switches mid-turn are queued and applied at the next Idle
    /// transition.
    fn queue_mode(&mut self, mode: Mode) {
        if self.session.mode() != mode {
            self.pending_mode = Some(mode);
            self.emit_notice("Mode switch queued");
        }
    }

    fn set_state(&mut self, state: ConversationState) {
        if self.session.state() != state {
            self.session.set_state(state);
            self.emit(UiEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.events_tx.send(event);
    }

    fn emit_notice(&self, text: &str) {
        self.emit(UiEvent::Notice(text.to_string()));
    }
}
