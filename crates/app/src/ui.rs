//! Command/event boundary between the orchestrator and the terminal UI.

use crate::session::{ConversationState, Mode, Turn, TurnId};

/// Input events consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    /// Applied immediately in Idle, otherwise queued for the next
    /// Idle transition.
    SetMode(Mode),
    PttDown,
    PttUp,
    /// Manual barge-in equivalent: stop generating/speaking now.
    Interrupt,
    /// Empty the transcript. Honoured only while Idle.
    ClearHistory,
    /// Re-run generation for the most recent user turn. Idle only.
    RedoLast,
    Exit,
}

/// State-change and transcript notifications emitted by the
/// orchestrator. Turns are carried as immutable snapshots.
#[derive(Debug, Clone)]
pub enum UiEvent {
    StateChanged(ConversationState),
    ModeChanged(Mode),
    TurnAppended(Turn),
    TurnUpdated { id: TurnId, text: String },
    TurnCompleted(Turn),
    TranscriptCleared,
    /// Full transcript snapshot after a non-append mutation (redo).
    TranscriptReset(Vec<Turn>),
    /// Human-readable status line ("Transcribing…", engine errors).
    Notice(String),
}
