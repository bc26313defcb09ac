//! Terminal UI rendering with ratatui

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph},
};

use horizon_core::{
    Availability, PowerState,
    state::{InputMode, StatusLevel},
};

use crate::app::App;

/// Main draw function
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title bar
            Constraint::Min(1),    // Channel list
            Constraint::Length(1), // Status bar
            Constraint::Length(1), // Input line (for filter/command)
        ])
        .split(f.area());

    draw_title_bar(f, app, chunks[0]);
    draw_channel_list(f, app, chunks[1]);
    draw_status_bar(f, app, chunks[2]);
    draw_input_line(f, app, chunks[3]);
}

/// Draw the title bar with household, availability and power
fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let household = app.state.household_id.as_deref().unwrap_or("-");
    let device = &app.state.device;

    let (availability, availability_color) = match &device.availability {
        Availability::Unknown => (" [Connecting]".to_string(), Color::Yellow),
        Availability::Available => (" [Available]".to_string(), Color::Green),
        Availability::Unavailable(_) => (" [Unavailable]".to_string(), Color::Red),
    };

    let power_color = match device.power {
        PowerState::On => Color::Green,
        PowerState::Off => Color::Gray,
        PowerState::Unknown => Color::Yellow,
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} ", household),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(availability, Style::default().fg(availability_color)),
        Span::styled(format!(" power:{}", device.power), Style::default().fg(power_color)),
    ];
    if let Some(box_id) = app.channel.active_device() {
        spans.push(Span::styled(format!("  {}", box_id), Style::default().fg(Color::Gray)));
    }
    if app.state.in_flight > 0 {
        spans.push(Span::styled(" ...", Style::default().fg(Color::Yellow)));
    }

    let title_bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));

    f.render_widget(title_bar, area);
}

/// Draw the channel list
fn draw_channel_list(f: &mut Frame, app: &App, area: Rect) {
    let visible_height = area.height as usize;
    let start = app.state.scroll_offset;

    let items: Vec<ListItem> = app
        .state
        .visible_channels()
        .enumerate()
        .skip(start)
        .take(visible_height)
        .map(|(i, channel)| {
            let number = channel.number.map(|n| n.to_string()).unwrap_or_default();
            let line = format!(" {:>4}  {}", number, channel.title);

            let style = if i == app.state.cursor {
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            ListItem::new(Line::from(Span::styled(line, style)))
        })
        .collect();

    f.render_widget(List::new(items), area);
}

/// Draw the status bar
fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if let Some((ref msg, ref level)) = app.state.status_message {
        let color = match level {
            StatusLevel::Info => Color::Blue,
            StatusLevel::Success => Color::Green,
            StatusLevel::Warning => Color::Yellow,
            StatusLevel::Error => Color::Red,
        };
        (msg.clone(), Style::default().fg(color))
    } else {
        // Default hints based on mode
        let hints = match app.state.input_mode {
            InputMode::Normal => "j↓ k↑ │ Enter:zap p:power Space:pause b:back │ /:filter r:reconnect ?:help q:quit",
            InputMode::Filter => "Type to filter │ Enter:keep │ Esc:clear",
            InputMode::Command => "channel <n> │ key <name> │ reconnect │ q │ Esc:cancel",
        };
        (hints.to_string(), Style::default().fg(Color::DarkGray))
    };

    let status_bar = Paragraph::new(text).style(style);
    f.render_widget(status_bar, area);
}

/// Draw the input line (for filter/command modes)
fn draw_input_line(f: &mut Frame, app: &App, area: Rect) {
    let (prefix, content) = match app.state.input_mode {
        InputMode::Filter => ("/", app.state.filter.as_str()),
        InputMode::Command => (":", app.state.command_input.as_str()),
        InputMode::Normal if !app.state.filter.is_empty() => ("filter: ", app.state.filter.as_str()),
        InputMode::Normal => ("", ""),
    };

    let input_line = Paragraph::new(format!("{}{}", prefix, content)).style(Style::default().fg(Color::White));

    f.render_widget(input_line, area);

    // Show cursor in input modes
    if app.state.input_mode != InputMode::Normal {
        let x = area.x + prefix.len() as u16 + content.chars().count() as u16;
        f.set_cursor_position((x, area.y));
    }
}
