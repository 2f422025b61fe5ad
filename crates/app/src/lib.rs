pub mod chunker;
pub mod config;
pub mod gate_task;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod speak;
pub mod tui;
pub mod ui;
