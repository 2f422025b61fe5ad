// Logging behavior:
// - Logs go to a daily-rotated file at logs/confab.log, never stdout,
//   so the TUI display stays intact.
// - Level comes from --log-level, falling back to RUST_LOG.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use confab_app::config::AppConfig;
use confab_app::runtime::AppHandle;
use confab_app::tui;

#[derive(Parser)]
#[command(author, version, about = "Spoken conversation in the terminal")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "confab.toml")]
    config: PathBuf,
    /// Input device name (overrides the config)
    #[arg(short = 'D', long)]
    device: Option<String>,
    /// Output device name (overrides the config)
    #[arg(long)]
    output_device: Option<String>,
    /// Conversation mode (overrides the config)
    #[arg(long, value_enum)]
    mode: Option<CliMode>,
    /// Log level filter (overrides RUST_LOG)
    #[arg(long = "log-level", default_value = "")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliMode {
    PushToTalk,
    Passive,
}

fn init_logging(cli_level: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "confab.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let effective_level = if !cli_level.is_empty() {
        cli_level.to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };
    let env_filter = EnvFilter::try_new(effective_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();
    // Keep the writer alive for the process lifetime.
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(device) = cli.device {
        config.audio.input_device = Some(device);
    }
    if let Some(device) = cli.output_device {
        config.audio.output_device = Some(device);
    }
    if let Some(mode) = cli.mode {
        config.chat.mode = match mode {
            CliMode::PushToTalk => "push_to_talk".to_string(),
            CliMode::Passive => "passive".to_string(),
        };
    }

    let app = AppHandle::start(&config).await?;
    let commands = app.commands();
    let events = app.subscribe_events();

    let ui_result = tui::run(commands, events).await;
    app.shutdown().await;
    ui_result?;
    Ok(())
}
