//! horizon-remote: terminal remote control for Horizon set-top boxes
//!
//! Vim-style channel browser with:
//! - j/k navigation and / filtering over the channel lineup
//! - Enter to zap, p/Space/b for power, pause and back
//! - Live power state from the box's status reports

mod app;
mod input;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use horizon_core::{Config, Credentials, RealtimeChannel, SessionManager, lineup, session};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{App, AppResult};
use crate::input::handle_key;

/// Rows taken by the title, status and input lines
const CHROME_ROWS: u16 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to file (not stdout, would interfere with TUI)
    let log_dir = dirs::cache_dir()
        .map(|d| d.join("horizon"))
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "horizon-remote.log");

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "horizon_remote=debug,horizon_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(file_appender))
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Using default config: {}", e);
        Config::default()
    });

    let username = config
        .account
        .username
        .clone()
        .or_else(|| std::env::var("HORIZON_USERNAME").ok())
        .context("No username: set [account].username in the config or HORIZON_USERNAME")?;
    let password = std::env::var("HORIZON_PASSWORD").context("HORIZON_PASSWORD is not set")?;

    // Verify credentials before taking over the terminal
    let credentials = Credentials::new(username, password);
    let household_id = session::verify_credentials(&config.service, credentials.clone())
        .await
        .context("Login failed")?
        .household_id;
    info!("Logged in to household {}", household_id);

    let http = reqwest::Client::builder()
        .timeout(config.service.http_timeout())
        .build()?;
    let channels = match lineup::fetch_channels(&http, &config.lineup).await {
        Ok(channels) => channels,
        Err(e) => {
            warn!("Lineup unavailable: {}", e);
            Vec::new()
        }
    };

    let sessions = SessionManager::new(&config.service, credentials)?;
    let channel = RealtimeChannel::new(&config.service, sessions);
    let mut app = App::new(channel.clone(), household_id, channels);
    app.connect();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    channel.destroy().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Main application loop
async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        app.state.visible_rows = terminal.size()?.height.saturating_sub(CHROME_ROWS).max(1) as usize;

        // Draw UI
        terminal.draw(|f| ui::draw(f, app))?;

        // Poll for events with timeout (allows spawned commands to report back)
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                match handle_key(app, key) {
                    AppResult::Continue => {}
                    AppResult::Quit => return Ok(()),
                }
            }
        }

        // Apply command results and status reports
        app.tick();
    }
}
