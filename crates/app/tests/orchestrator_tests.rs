//! End-to-end orchestrator tests over scripted engines and a fake
//! sink. Audio devices are never touched; frames and gate events are
//! injected directly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use confab_audio::{AudioBuffer, AudioFrame, AudioSink, PlaybackOutcome};
use confab_foundation::PlaybackError;
use confab_llm::scripted::ScriptedModel;
use confab_llm::LanguageModel;
use confab_stt::scripted::ScriptedTranscriber;
use confab_stt::{Transcriber, TranscriptionError};
use confab_tts::{SynthesisError, SynthesisOptions, Synthesizer};
use confab_vad::GateEvent;

use confab_app::orchestrator::{Orchestrator, OrchestratorConfig};
use confab_app::session::{ConversationState, Mode, Speaker, Turn};
use confab_app::ui::{UiCommand, UiEvent};

const RATE: u32 = 16_000;
const WAIT: Duration = Duration::from_secs(5);

/// Records synthesized texts in order; emits one short buffer per
/// chunk.
struct RecordingSynth {
    texts: Mutex<Vec<String>>,
}

impl RecordingSynth {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(Vec::new()),
        })
    }

    fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl Synthesizer for RecordingSynth {
    fn synthesize(
        &self,
        text: &str,
        _options: &SynthesisOptions,
    ) -> Result<Vec<AudioBuffer>, SynthesisError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(vec![AudioBuffer {
            samples: vec![0; 240],
            sample_rate: RATE,
        }])
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }
}

/// Sink that can hold playback open until interrupted, and tracks how
/// many plays ever ran concurrently.
struct FakeSink {
    hold: AtomicBool,
    /// Per-buffer playback time, zero for as-fast-as-possible.
    delay_ms: AtomicUsize,
    playing: AtomicUsize,
    max_concurrent: AtomicUsize,
    interrupts: AtomicUsize,
    plays: AtomicUsize,
    interrupt_tx: watch::Sender<u64>,
    interrupt_rx: watch::Receiver<u64>,
}

impl FakeSink {
    fn new(hold: bool) -> Arc<Self> {
        let (interrupt_tx, interrupt_rx) = watch::channel(0);
        Arc::new(Self {
            hold: AtomicBool::new(hold),
            delay_ms: AtomicUsize::new(0),
            playing: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
            plays: AtomicUsize::new(0),
            interrupt_tx,
            interrupt_rx,
        })
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        let sink = Self::new(false);
        sink.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
        sink
    }
}

struct PlayGuard<'a>(&'a AtomicUsize);

impl Drop for PlayGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, _buffer: AudioBuffer) -> Result<PlaybackOutcome, PlaybackError> {
        let now = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let _guard = PlayGuard(&self.playing);
        self.plays.fetch_add(1, Ordering::SeqCst);

        if self.hold.load(Ordering::SeqCst) {
            let mut rx = self.interrupt_rx.clone();
            let _ = rx.changed().await;
            Ok(PlaybackOutcome::Interrupted)
        } else {
            match self.delay_ms.load(Ordering::SeqCst) {
                0 => tokio::task::yield_now().await,
                ms => tokio::time::sleep(Duration::from_millis(ms as u64)).await,
            }
            Ok(PlaybackOutcome::Completed)
        }
    }

    async fn interrupt(&self, _fade: Duration) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.interrupt_tx.send_modify(|n| *n += 1);
    }
}

struct Harness {
    frames_tx: broadcast::Sender<AudioFrame>,
    gate_tx: mpsc::Sender<GateEvent>,
    commands: mpsc::Sender<UiCommand>,
    events: broadcast::Receiver<UiEvent>,
    seq: u64,
    _handle: JoinHandle<()>,
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        min_utterance: Duration::from_millis(100),
        generation_timeout: Duration::from_secs(5),
        transcription_timeout: Duration::from_secs(5),
        cancel_timeout: Duration::from_secs(2),
        fade: Duration::from_millis(10),
        chunk_queue: 2,
        chunk_max_chars: 200,
    }
}

fn spawn(
    mode: Mode,
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn LanguageModel>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
) -> Harness {
    spawn_with(test_config(), mode, transcriber, model, synthesizer, sink)
}

fn spawn_with(
    cfg: OrchestratorConfig,
    mode: Mode,
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn LanguageModel>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
) -> Harness {
    let (frames_tx, frames_rx) = broadcast::channel(256);
    let (gate_tx, gate_rx) = mpsc::channel(64);
    let (commands, commands_rx) = mpsc::channel(64);
    let (events_tx, events) = broadcast::channel(256);

    let handle = Orchestrator::new(
        cfg,
        mode,
        RATE,
        frames_rx,
        gate_rx,
        commands_rx,
        events_tx,
        transcriber,
        model,
        synthesizer,
        sink,
        Some("be brief".to_string()),
        SynthesisOptions::default(),
    )
    .spawn();

    Harness {
        frames_tx,
        gate_tx,
        commands,
        events,
        seq: 0,
        _handle: handle,
    }
}

impl Harness {
    async fn send(&self, cmd: UiCommand) {
        self.commands.send(cmd).await.expect("orchestrator alive");
    }

    /// Injects `n` frames of 100ms each.
    fn feed_frames(&mut self, n: usize) {
        for _ in 0..n {
            let frame = AudioFrame {
                samples: vec![1_000; (RATE / 10) as usize],
                seq: self.seq,
                sample_rate: RATE,
            };
            self.seq += 1;
            self.frames_tx.send(frame).expect("receiver alive");
        }
    }

    async fn wait_state(&mut self, want: ConversationState) {
        self.wait_for(|e| matches!(e, UiEvent::StateChanged(s) if *s == want))
            .await;
    }

    async fn wait_for(&mut self, pred: impl Fn(&UiEvent) -> bool) -> UiEvent {
        timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("event channel open");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Collects every event up to and including the next Idle state
    /// change.
    async fn collect_until_idle(&mut self) -> Vec<UiEvent> {
        timeout(WAIT, async {
            let mut out = Vec::new();
            loop {
                let event = self.events.recv().await.expect("event channel open");
                let done = matches!(event, UiEvent::StateChanged(ConversationState::Idle));
                out.push(event);
                if done {
                    return out;
                }
            }
        })
        .await
        .expect("timed out waiting for idle")
    }
}

fn states(events: &[UiEvent]) -> Vec<ConversationState> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

fn completed_turns(events: &[UiEvent]) -> Vec<Turn> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::TurnCompleted(t) => Some(t.clone()),
            _ => None,
        })
        .collect()
}

fn appended_turns(events: &[UiEvent]) -> Vec<Turn> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::TurnAppended(t) => Some(t.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn push_to_talk_exchange_speaks_chunks_in_order() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("hi".into())])),
        Arc::new(ScriptedModel::new(vec![ScriptedModel::reply(&[
            "Hi! ",
            "How can I help?",
        ])])),
        synth.clone(),
        sink.clone(),
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    // Give the listening loop a beat to drain the frames.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;

    let events = h.collect_until_idle().await;

    let seen = states(&events);
    for want in [
        ConversationState::Transcribing,
        ConversationState::Generating,
        ConversationState::Speaking,
        ConversationState::Idle,
    ] {
        assert!(seen.contains(&want), "missing state {want:?} in {seen:?}");
    }

    let appended = appended_turns(&events);
    assert_eq!(appended[0].speaker, Speaker::User);
    assert_eq!(appended[0].text, "hi");

    let completed = completed_turns(&events);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].speaker, Speaker::Assistant);
    assert_eq!(completed[0].text, "Hi! How can I help?");

    assert_eq!(synth.texts(), vec!["Hi!", "How can I help?"]);
    assert_eq!(sink.plays.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn barge_in_completes_turn_and_listens_atomically() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(true); // playback blocks until interrupted
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("tell me more".into())])),
        Arc::new(
            ScriptedModel::new(vec![ScriptedModel::reply(&[
                "First sentence. ",
                "Second sentence. ",
                "Third sentence. ",
                "Fourth sentence.",
            ])])
            .with_delta_delay(Duration::from_millis(20)),
        ),
        synth.clone(),
        sink.clone(),
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;
    h.wait_state(ConversationState::Speaking).await;

    // Barge in while the first buffer is still playing.
    h.send(UiCommand::PttDown).await;

    let completed = timeout(WAIT, async {
        let mut held = Vec::new();
        loop {
            let event = h.events.recv().await.expect("event channel open");
            held.push(event.clone());
            if matches!(event, UiEvent::StateChanged(ConversationState::Listening)) {
                return held;
            }
        }
    })
    .await
    .expect("timed out waiting for listening");

    // The completed partial turn and the Listening transition arrive
    // back to back.
    let turn_at = completed
        .iter()
        .position(|e| matches!(e, UiEvent::TurnCompleted(_)))
        .expect("partial assistant turn completed");
    assert!(matches!(
        completed[turn_at + 1],
        UiEvent::StateChanged(ConversationState::Listening)
    ));
    if let UiEvent::TurnCompleted(turn) = &completed[turn_at] {
        assert_eq!(turn.speaker, Speaker::Assistant);
        assert!(turn.is_complete());
    }

    assert!(sink.interrupts.load(Ordering::SeqCst) >= 1);

    // Releasing with no audio discards the utterance quietly.
    h.send(UiCommand::PttUp).await;
    let events = h.collect_until_idle().await;
    assert!(appended_turns(&events).is_empty());
}

#[tokio::test]
async fn transcription_failure_appends_no_user_turn() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Err(
            TranscriptionError::Engine("decoder died".into()),
        )])),
        Arc::new(ScriptedModel::new(vec![])),
        synth.clone(),
        sink,
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;

    let events = h.collect_until_idle().await;
    assert!(appended_turns(&events).is_empty());
    assert!(events.iter().any(
        |e| matches!(e, UiEvent::Notice(n) if n.contains("Transcription failed")),
    ));
    assert!(synth.texts().is_empty());
}

#[tokio::test]
async fn generation_failure_keeps_partial_text() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("go on".into())])),
        Arc::new(ScriptedModel::new(vec![vec![
            Ok("Partial thought".to_string()),
            Err(confab_llm::GenerationError::Engine("oom".into())),
        ]])),
        synth.clone(),
        sink,
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;

    let events = h.collect_until_idle().await;
    let completed = completed_turns(&events);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].text, "Partial thought");
    // The flushed remainder still gets spoken.
    assert_eq!(synth.texts(), vec!["Partial thought"]);
}

#[tokio::test]
async fn short_utterance_is_discarded() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("never used".into())])),
        Arc::new(ScriptedModel::new(vec![])),
        synth.clone(),
        sink,
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    // Release immediately: nothing captured.
    h.send(UiCommand::PttUp).await;

    let events = h.collect_until_idle().await;
    assert!(!states(&events).contains(&ConversationState::Transcribing));
    assert!(appended_turns(&events).is_empty());
}

#[tokio::test]
async fn passive_mode_turns_on_gate_events() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::Passive,
        Arc::new(ScriptedTranscriber::new(vec![Ok("ahoy".into())])),
        Arc::new(ScriptedModel::new(vec![])),
        synth.clone(),
        sink,
    );

    h.gate_tx
        .send(GateEvent::SpeechStart {
            timestamp_ms: 0,
            energy_dbfs: -20.0,
        })
        .await
        .unwrap();
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.gate_tx
        .send(GateEvent::SpeechEnd {
            timestamp_ms: 300,
            duration_ms: 300,
            energy_dbfs: -60.0,
        })
        .await
        .unwrap();

    let events = h.collect_until_idle().await;
    let appended = appended_turns(&events);
    assert_eq!(appended[0].text, "ahoy");
    // Scripted echo reply spoken to the end.
    assert_eq!(completed_turns(&events)[0].text, "You said: ahoy.");
}

#[tokio::test]
async fn playback_never_overlaps_across_barge_ins() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(true);
    let long_reply = || {
        ScriptedModel::reply(&[
            "One sentence here. ",
            "Two sentences here. ",
            "Three sentences here.",
        ])
    };
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![
            Ok("first".into()),
            Ok("second".into()),
        ])),
        Arc::new(
            ScriptedModel::new(vec![long_reply(), long_reply()])
                .with_delta_delay(Duration::from_millis(10)),
        ),
        synth.clone(),
        sink.clone(),
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;
    h.wait_state(ConversationState::Speaking).await;

    // Barge in and run a second exchange to completion.
    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.hold.store(false, Ordering::SeqCst);
    h.send(UiCommand::PttUp).await;

    let events = h.collect_until_idle().await;
    assert_eq!(completed_turns(&events).len(), 1);
    assert_eq!(sink.max_concurrent.load(Ordering::SeqCst), 1);
    assert!(sink.interrupts.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn interrupt_command_stops_reply_and_idles() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(true);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("talk".into())])),
        Arc::new(
            ScriptedModel::new(vec![ScriptedModel::reply(&[
                "A long reply. ",
                "That keeps going. ",
                "And going.",
            ])])
            .with_delta_delay(Duration::from_millis(20)),
        ),
        synth.clone(),
        sink.clone(),
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;
    h.wait_state(ConversationState::Speaking).await;

    h.send(UiCommand::Interrupt).await;
    let events = h.collect_until_idle().await;
    let seen = states(&events);
    assert!(seen.contains(&ConversationState::Cancelling));
    assert_eq!(completed_turns(&events).len(), 1);
}

#[tokio::test]
async fn mode_switch_mid_reply_applies_at_idle() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(true);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("switch".into())])),
        Arc::new(
            ScriptedModel::new(vec![ScriptedModel::reply(&["Sure thing. ", "Done."])])
                .with_delta_delay(Duration::from_millis(20)),
        ),
        synth.clone(),
        sink.clone(),
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;
    h.wait_state(ConversationState::Speaking).await;

    h.send(UiCommand::SetMode(Mode::Passive)).await;
    h.wait_for(|e| matches!(e, UiEvent::Notice(n) if n.contains("queued")))
        .await;
    h.send(UiCommand::Interrupt).await;

    let events = h.collect_until_idle().await;
    // The switch lands only once the reply is fully torn down.
    let turn_at = events
        .iter()
        .position(|e| matches!(e, UiEvent::TurnCompleted(_)))
        .expect("reply turn completed");
    let mode_at = events
        .iter()
        .position(|e| matches!(e, UiEvent::ModeChanged(Mode::Passive)))
        .expect("mode applied at idle");
    assert!(mode_at > turn_at);
}

#[tokio::test]
async fn random_interrupt_timing_never_overlaps_playback() {
    use rand::Rng;

    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let rounds = 5;
    let script: Vec<_> = (0..rounds).map(|i| Ok(format!("round {i}"))).collect();
    let replies = (0..rounds)
        .map(|_| {
            ScriptedModel::reply(&[
                "Let me think. ",
                "Here is a longer answer. ",
                "With several sentences. ",
                "That take a while.",
            ])
        })
        .collect();
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(script)),
        Arc::new(ScriptedModel::new(replies).with_delta_delay(Duration::from_millis(5))),
        synth.clone(),
        sink.clone(),
    );

    let mut rng = rand::thread_rng();
    for _ in 0..rounds {
        h.send(UiCommand::PttDown).await;
        h.wait_state(ConversationState::Listening).await;
        h.feed_frames(3);
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.send(UiCommand::PttUp).await;

        // Interrupt at an arbitrary point of the reply; sometimes it
        // has already finished, which must also be harmless.
        tokio::time::sleep(Duration::from_millis(rng.gen_range(0..80))).await;
        h.send(UiCommand::Interrupt).await;
        h.wait_state(ConversationState::Idle).await;
    }

    assert!(sink.max_concurrent.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn slow_playback_backpressure_does_not_trip_generation_timeout() {
    let synth = RecordingSynth::new();
    // Each buffer plays for longer than the generation progress bound,
    // so delta pulls stay paused well past it while chunks drain.
    let sink = FakeSink::with_delay(Duration::from_millis(100));
    let mut cfg = test_config();
    cfg.generation_timeout = Duration::from_millis(150);
    let mut h = spawn_with(
        cfg,
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("count to seven".into())])),
        Arc::new(ScriptedModel::new(vec![ScriptedModel::reply(&[
            "One. ", "Two. ", "Three. ", "Four. ", "Five. ", "Six. ", "Seven.",
        ])])),
        synth.clone(),
        sink.clone(),
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;

    let events = h.collect_until_idle().await;
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, UiEvent::Notice(n) if n.contains("Generation timed out"))),
        "healthy stream cancelled while paused for backpressure"
    );
    let completed = completed_turns(&events);
    assert_eq!(completed[0].text, "One. Two. Three. Four. Five. Six. Seven.");
    assert_eq!(synth.texts().len(), 7);
    assert_eq!(sink.max_concurrent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capture_loss_stops_the_session_with_a_notice() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("unused".into())])),
        Arc::new(ScriptedModel::new(vec![])),
        synth.clone(),
        sink,
    );

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(2);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The input device dying closes the frame broadcast; there is no
    // session without a microphone.
    let (dummy, _dummy_rx) = broadcast::channel(1);
    drop(std::mem::replace(&mut h.frames_tx, dummy));

    h.wait_for(|e| matches!(e, UiEvent::Notice(n) if n.contains("Audio capture stopped")))
        .await;
    timeout(WAIT, h._handle)
        .await
        .expect("orchestrator exits after capture loss")
        .unwrap();
}

#[tokio::test]
async fn clear_and_redo_manage_the_transcript() {
    let synth = RecordingSynth::new();
    let sink = FakeSink::new(false);
    let mut h = spawn(
        Mode::PushToTalk,
        Arc::new(ScriptedTranscriber::new(vec![Ok("hello".into())])),
        Arc::new(ScriptedModel::new(vec![ScriptedModel::reply(&[
            "Hi there.",
        ])])),
        synth.clone(),
        sink,
    );

    // Redo with nothing recorded is a no-op.
    h.send(UiCommand::RedoLast).await;
    h.wait_for(|e| matches!(e, UiEvent::Notice(n) if n.contains("Nothing to redo")))
        .await;

    h.send(UiCommand::PttDown).await;
    h.wait_state(ConversationState::Listening).await;
    h.feed_frames(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.send(UiCommand::PttUp).await;
    let events = h.collect_until_idle().await;
    assert_eq!(completed_turns(&events)[0].text, "Hi there.");

    // Redo re-runs generation for the same user text; the scripted
    // model is exhausted, so the echo reply comes back.
    h.send(UiCommand::RedoLast).await;
    h.wait_for(|e| matches!(e, UiEvent::TranscriptReset(_))).await;
    let events = h.collect_until_idle().await;
    assert_eq!(appended_turns(&events)[0].text, "hello");
    assert_eq!(completed_turns(&events)[0].text, "You said: hello.");

    h.send(UiCommand::ClearHistory).await;
    h.wait_for(|e| matches!(e, UiEvent::TranscriptCleared)).await;
}
