//! Conversation session state: mode, state machine phase, transcript.
//!
//! The session is mutated only by the orchestrator's coordination
//! task; everything else sees immutable snapshots carried on events.

use std::time::Instant;

use confab_llm::{ChatRole, ChatTurn};

pub type TurnId = u64;

/// How utterance boundaries are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    PushToTalk,
    Passive,
}

/// The orchestrator's phase. Exactly one of {no active turn, one
/// active user turn, one active assistant turn} holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    Listening,
    Transcribing,
    Generating,
    Speaking,
    Cancelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One exchange entry. Immutable once `completed_at` is set.
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: TurnId,
    pub speaker: Speaker,
    pub text: String,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
}

impl Turn {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Process-wide conversation state for one running instance.
pub struct Session {
    mode: Mode,
    state: ConversationState,
    turns: Vec<Turn>,
    next_turn_id: TurnId,
}

impl Session {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: ConversationState::Idle,
            turns: Vec::new(),
            next_turn_id: 1,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn set_state(&mut self, state: ConversationState) {
        if self.state != state {
            tracing::debug!("conversation state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Appends a completed user turn.
    pub fn append_user(&mut self, text: String) -> Turn {
        let now = Instant::now();
        let turn = Turn {
            id: self.take_id(),
            speaker: Speaker::User,
            text,
            started_at: now,
            completed_at: Some(now),
        };
        self.turns.push(turn.clone());
        turn
    }

    /// Appends an in-progress assistant turn with empty text; it grows
    /// by `append_assistant_text` until `complete_turn`.
    pub fn begin_assistant(&mut self) -> Turn {
        let turn = Turn {
            id: self.take_id(),
            speaker: Speaker::Assistant,
            text: String::new(),
            started_at: Instant::now(),
            completed_at: None,
        };
        self.turns.push(turn.clone());
        turn
    }

    /// Append-only growth; ignored once the turn is complete.
    pub fn append_assistant_text(&mut self, id: TurnId, delta: &str) -> Option<String> {
        let turn = self.turns.iter_mut().find(|t| t.id == id)?;
        if turn.is_complete() {
            return None;
        }
        turn.text.push_str(delta);
        Some(turn.text.clone())
    }

    pub fn complete_turn(&mut self, id: TurnId) -> Option<Turn> {
        let turn = self.turns.iter_mut().find(|t| t.id == id)?;
        if turn.completed_at.is_none() {
            turn.completed_at = Some(Instant::now());
        }
        Some(turn.clone())
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Removes the last user/assistant exchange and returns the user
    /// text, for the redo command. The transcript is otherwise
    /// append-only, so this is only legal while no turn is active.
    pub fn pop_last_exchange(&mut self) -> Option<String> {
        let last_user = self
            .turns
            .iter()
            .rposition(|t| t.speaker == Speaker::User)?;
        let text = self.turns[last_user].text.clone();
        self.turns.truncate(last_user);
        Some(text)
    }

    /// Transcript handed to the generation engine, in creation order,
    /// prefixed with the system prompt. In-progress turns are
    /// excluded; completed turns are passed verbatim.
    pub fn chat_transcript(&self, system_prompt: Option<&str>) -> Vec<ChatTurn> {
        let mut out = Vec::with_capacity(self.turns.len() + 1);
        if let Some(prompt) = system_prompt {
            out.push(ChatTurn {
                role: ChatRole::System,
                text: prompt.to_string(),
            });
        }
        for turn in self.turns.iter().filter(|t| t.is_complete()) {
            out.push(ChatTurn {
                role: match turn.speaker {
                    Speaker::User => ChatRole::User,
                    Speaker::Assistant => ChatRole::Assistant,
                },
                text: turn.text.clone(),
            });
        }
        out
    }

    fn take_id(&mut self) -> TurnId {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        id
    }
}
