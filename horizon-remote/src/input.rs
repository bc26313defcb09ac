//! Keyboard input handling with vim-style bindings

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use horizon_core::{
    Key,
    lineup::find_by_number,
    state::{InputMode, StatusLevel},
};

use crate::app::{App, AppResult, RemoteAction};

/// A parsed command-mode line
#[derive(Debug, PartialEq, Eq)]
pub enum RemoteCommand {
    Channel(u32),
    Key(Key),
    Reconnect,
    Quit,
}

/// Handle a key event
pub fn handle_key(app: &mut App, key: KeyEvent) -> AppResult {
    match app.state.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Filter => handle_filter_mode(app, key),
        InputMode::Command => handle_command_mode(app, key),
    }
}

/// Handle keys in normal mode (main navigation)
fn handle_normal_mode(app: &mut App, key: KeyEvent) -> AppResult {
    match key.code {
        KeyCode::Char('q') => return AppResult::Quit,

        // Navigation (vim-style)
        KeyCode::Char('j') | KeyCode::Down => {
            app.state.cursor_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.state.cursor_up();
        }
        KeyCode::Char('g') | KeyCode::Home => {
            app.state.cursor_top();
        }
        KeyCode::Char('G') | KeyCode::End => {
            app.state.cursor_bottom();
        }

        // Page navigation
        KeyCode::PageDown | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            for _ in 0..app.state.visible_rows {
                app.state.cursor_down();
            }
        }
        KeyCode::PageUp | KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            for _ in 0..app.state.visible_rows {
                app.state.cursor_up();
            }
        }

        // Remote keys
        KeyCode::Enter | KeyCode::Char('l') => {
            app.zap_selected();
        }
        KeyCode::Char('p') => {
            app.dispatch(RemoteAction::Press(Key::Power));
        }
        KeyCode::Char(' ') => {
            app.dispatch(RemoteAction::Press(Key::MediaPause));
        }
        KeyCode::Char('b') | KeyCode::Backspace => {
            app.dispatch(RemoteAction::Press(Key::Escape));
        }
        KeyCode::Char('r') => {
            app.connect();
        }

        // Mode switching
        KeyCode::Char('/') => {
            app.state.enter_filter_mode();
        }
        KeyCode::Char(':') => {
            app.state.enter_command_mode();
        }

        // Escape clears the filter
        KeyCode::Esc => {
            app.state.clear_filter();
            app.state.clear_status();
        }

        // Help
        KeyCode::Char('?') => {
            app.state.set_status(
                "j/k:move Enter:zap p:power space:pause b:back /:filter r:reconnect q:quit",
                StatusLevel::Info,
            );
        }

        _ => {}
    }

    AppResult::Continue
}

/// Handle keys in filter mode; the list narrows as you type
fn handle_filter_mode(app: &mut App, key: KeyEvent) -> AppResult {
    match key.code {
        KeyCode::Esc => {
            app.state.exit_input_mode();
            app.state.clear_filter();
        }
        KeyCode::Enter => {
            app.state.exit_input_mode();
        }
        KeyCode::Backspace => {
            app.state.filter.pop();
            app.state.apply_filter();
        }
        KeyCode::Char(c) => {
            app.state.filter.push(c);
            app.state.apply_filter();
        }
        _ => {}
    }

    AppResult::Continue
}

/// Handle keys in command mode
fn handle_command_mode(app: &mut App, key: KeyEvent) -> AppResult {
    match key.code {
        KeyCode::Esc => {
            app.state.exit_input_mode();
        }
        KeyCode::Enter => {
            let cmd = app.state.command_input.clone();
            app.state.exit_input_mode();
            return execute_command(app, &cmd);
        }
        KeyCode::Backspace => {
            app.state.command_input.pop();
        }
        KeyCode::Char(c) => {
            app.state.command_input.push(c);
        }
        _ => {}
    }

    AppResult::Continue
}

/// Parse a command-mode line. `Ok(None)` for a blank line.
pub fn parse_command(cmd: &str) -> Result<Option<RemoteCommand>, String> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    let command = match parts.as_slice() {
        [] => return Ok(None),
        ["q" | "quit"] => RemoteCommand::Quit,
        ["reconnect"] => RemoteCommand::Reconnect,
        ["channel" | "ch", number] => {
            let number = number
                .parse()
                .map_err(|_| format!("Not a channel number: {}", number))?;
            RemoteCommand::Channel(number)
        }
        ["key", name] => RemoteCommand::Key(Key::from_name(name)),
        ["channel" | "ch" | "key", ..] => return Err(format!("Usage: {} <arg>", parts[0])),
        [unknown, ..] => return Err(format!("Unknown command: {}", unknown)),
    };
    Ok(Some(command))
}

/// Execute a command-mode command
fn execute_command(app: &mut App, cmd: &str) -> AppResult {
    match parse_command(cmd) {
        Ok(Some(RemoteCommand::Quit)) => return AppResult::Quit,
        Ok(Some(RemoteCommand::Reconnect)) => app.connect(),
        Ok(Some(RemoteCommand::Channel(number))) => match find_by_number(&app.state.channels, number) {
            Some(channel) => {
                let action = RemoteAction::Zap {
                    id: channel.id.clone(),
                    title: channel.title.clone(),
                };
                app.dispatch(action);
            }
            None => app
                .state
                .set_status(format!("No channel {}", number), StatusLevel::Warning),
        },
        Ok(Some(RemoteCommand::Key(key))) => app.dispatch(RemoteAction::Press(key)),
        Ok(None) => {}
        Err(message) => app.state.set_status(message, StatusLevel::Error),
    }

    AppResult::Continue
}
