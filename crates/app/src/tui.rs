//! Terminal front-end: renders the transcript and state line, and
//! translates keystrokes into orchestrator commands.
//!
//! The UI holds no conversation state of its own; everything drawn
//! comes from orchestrator events, so a redraw after any event is
//! always consistent.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::{broadcast, mpsc};

use crate::session::{ConversationState, Mode, Speaker, Turn};
use crate::ui::{UiCommand, UiEvent};

const NOTICE_HISTORY: usize = 50;

struct TuiState {
    state: ConversationState,
    mode: Mode,
    turns: Vec<Turn>,
    notices: VecDeque<String>,
    /// Terminal key-release events are unreliable, so push-to-talk is
    /// a toggle: one press starts, the next stops.
    ptt_held: bool,
}

impl TuiState {
    fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            mode: Mode::PushToTalk,
            turns: Vec::new(),
            notices: VecDeque::new(),
            ptt_held: false,
        }
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::StateChanged(state) => {
                self.state = state;
                if state != ConversationState::Listening {
                    self.ptt_held = false;
                }
            }
            UiEvent::ModeChanged(mode) => self.mode = mode,
            UiEvent::TurnAppended(turn) => self.turns.push(turn),
            UiEvent::TurnUpdated { id, text } => {
                if let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) {
                    turn.text = text;
                }
            }
            UiEvent::TurnCompleted(turn) => {
                if let Some(slot) = self.turns.iter_mut().find(|t| t.id == turn.id) {
                    *slot = turn;
                } else {
                    self.turns.push(turn);
                }
            }
            UiEvent::TranscriptCleared => self.turns.clear(),
            UiEvent::TranscriptReset(turns) => self.turns = turns,
            UiEvent::Notice(text) => {
                self.notices.push_back(text);
                while self.notices.len() > NOTICE_HISTORY {
                    self.notices.pop_front();
                }
            }
        }
    }
}

pub async fn run(
    commands: mpsc::Sender<UiCommand>,
    events: broadcast::Receiver<UiEvent>,
) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, commands, events).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    commands: mpsc::Sender<UiCommand>,
    mut events: broadcast::Receiver<UiEvent>,
) -> io::Result<()> {
    let mut state = TuiState::new();
    let mut tick = tokio::time::interval(Duration::from_millis(50));

    loop {
        terminal.draw(|f| draw_ui(f, &state))?;

        tokio::select! {
            Some(event) = async {
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    event::read().ok()
                } else {
                    None
                }
            } => {
                if let Event::Key(key) = event {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                            let _ = commands.send(UiCommand::Exit).await;
                            return Ok(());
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            match state.mode {
                                Mode::PushToTalk => {
                                    let cmd = if state.ptt_held {
                                        UiCommand::PttUp
                                    } else {
                                        UiCommand::PttDown
                                    };
                                    state.ptt_held = !state.ptt_held;
                                    let _ = commands.send(cmd).await;
                                }
                                Mode::Passive => {
                                    state.apply(UiEvent::Notice(
                                        "Passive mode listens on its own".to_string(),
                                    ));
                                }
                            }
                        }
                        KeyCode::Char('m') | KeyCode::Char('M') => {
                            let next = match state.mode {
                                Mode::PushToTalk => Mode::Passive,
                                Mode::Passive => Mode::PushToTalk,
                            };
                            let _ = commands.send(UiCommand::SetMode(next)).await;
                        }
                        KeyCode::Char('i') | KeyCode::Char('I') => {
                            let _ = commands.send(UiCommand::Interrupt).await;
                        }
                        KeyCode::Char('c') | KeyCode::Char('C') => {
                            let _ = commands.send(UiCommand::ClearHistory).await;
                        }
                        KeyCode::Char('g') | KeyCode::Char('G') => {
                            let _ = commands.send(UiCommand::RedoLast).await;
                        }
                        _ => {}
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => state.apply(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        state.apply(UiEvent::Notice(format!("UI lagged, {n} events dropped")));
                    }
                    // Orchestrator gone; nothing more to render.
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }

            _ = tick.tick() => {}
        }
    }
}

fn draw_ui(f: &mut Frame, state: &TuiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_status(f, chunks[0], state);
    draw_transcript(f, chunks[1], state);
    draw_notices(f, chunks[2], state);
    draw_help(f, chunks[3], state);
}

fn state_label(state: ConversationState) -> (&'static str, Color) {
    match state {
        ConversationState::Idle => ("Idle", Color::Gray),
        ConversationState::Listening => ("Listening", Color::Red),
        ConversationState::Transcribing => ("Transcribing", Color::Yellow),
        ConversationState::Generating => ("Generating", Color::Cyan),
        ConversationState::Speaking => ("Speaking", Color::Green),
        ConversationState::Cancelling => ("Cancelling", Color::Magenta),
    }
}

fn draw_status(f: &mut Frame, area: Rect, state: &TuiState) {
    let (label, color) = state_label(state.state);
    let mode = match state.mode {
        Mode::PushToTalk => "push-to-talk",
        Mode::Passive => "passive",
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {label} "),
            Style::default()
                .fg(Color::Black)
                .bg(color)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  mode: {mode}")),
    ]);
    let status =
        Paragraph::new(line).block(Block::default().title("Confab").borders(Borders::ALL));
    f.render_widget(status, area);
}

fn draw_transcript(f: &mut Frame, area: Rect, state: &TuiState) {
    let mut lines = Vec::with_capacity(state.turns.len());
    for turn in &state.turns {
        let (who, style) = match turn.speaker {
            Speaker::User => ("you", Style::default().fg(Color::Cyan)),
            Speaker::Assistant => ("assistant", Style::default().fg(Color::Green)),
        };
        let marker = if turn.is_complete() { "" } else { " …" };
        lines.push(Line::from(vec![
            Span::styled(format!("{who}: "), style.add_modifier(Modifier::BOLD)),
            Span::raw(format!("{}{marker}", turn.text)),
        ]));
    }

    // Keep the tail visible once the transcript outgrows the pane.
    let visible = area.height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(visible) as u16;

    let transcript = Paragraph::new(lines)
        .block(Block::default().title("Transcript").borders(Borders::ALL))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(transcript, area);
}

fn draw_notices(f: &mut Frame, area: Rect, state: &TuiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = state
        .notices
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|n| Line::from(Span::styled(n.clone(), Style::default().fg(Color::Gray))))
        .collect();
    let notices =
        Paragraph::new(lines).block(Block::default().title("Status").borders(Borders::ALL));
    f.render_widget(notices, area);
}

fn draw_help(f: &mut Frame, area: Rect, state: &TuiState) {
    let record = match (state.mode, state.ptt_held) {
        (Mode::PushToTalk, false) => "r record",
        (Mode::PushToTalk, true) => "r stop",
        (Mode::Passive, _) => "r —",
    };
    let help = Paragraph::new(format!(
        " {record} | m mode | i interrupt | c clear | g redo | q quit"
    ))
    .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, area);
}
