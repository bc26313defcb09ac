//! Remote-control UI state
//!
//! Front-end agnostic: holds the lineup, the cursor over the (filtered)
//! channel list, the input mode and the status line. Rendering and key
//! handling live in the front-end.

use crate::device::DeviceStatus;
use crate::lineup::ChannelInfo;

/// UI input mode (vim-style)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing in the filter bar
    Filter,
    /// Typing command (: prefix)
    Command,
}

/// Status message severity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Application state
#[derive(Debug, Clone)]
pub struct RemoteState {
    // Lineup
    pub channels: Vec<ChannelInfo>,
    /// Indices into `channels` that match the filter
    pub visible: Vec<usize>,
    pub cursor: usize,
    pub scroll_offset: usize,
    pub visible_rows: usize,

    // UI state
    pub input_mode: InputMode,
    pub filter: String,
    pub command_input: String,
    pub status_message: Option<(String, StatusLevel)>,

    // Device
    pub household_id: Option<String>,
    pub device: DeviceStatus,
    /// Commands sent but not yet acknowledged by the transport
    pub in_flight: usize,
}

impl Default for RemoteState {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            visible: Vec::new(),
            cursor: 0,
            scroll_offset: 0,
            visible_rows: 20,

            input_mode: InputMode::Normal,
            filter: String::new(),
            command_input: String::new(),
            status_message: None,

            household_id: None,
            device: DeviceStatus::default(),
            in_flight: 0,
        }
    }
}

impl RemoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lineup
    pub fn set_channels(&mut self, channels: Vec<ChannelInfo>) {
        self.channels = channels;
        self.apply_filter();
    }

    /// Recompute the visible list from the filter text
    pub fn apply_filter(&mut self) {
        let visible = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.matches(&self.filter))
            .map(|(i, _)| i)
            .collect();
        self.visible = visible;
        self.cursor = 0;
        self.scroll_offset = 0;
    }

    /// Move cursor down
    pub fn cursor_down(&mut self) {
        if self.cursor + 1 < self.visible.len() {
            self.cursor += 1;
            self.ensure_cursor_visible();
        }
    }

    /// Move cursor up
    pub fn cursor_up(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.ensure_cursor_visible();
        }
    }

    /// Jump to first entry
    pub fn cursor_top(&mut self) {
        self.cursor = 0;
        self.scroll_offset = 0;
    }

    /// Jump to last entry
    pub fn cursor_bottom(&mut self) {
        if self.visible.is_empty() {
            return;
        }
        self.cursor = self.visible.len() - 1;
        self.ensure_cursor_visible();
    }

    /// Channel under the cursor
    pub fn current_channel(&self) -> Option<&ChannelInfo> {
        self.visible.get(self.cursor).and_then(|&i| self.channels.get(i))
    }

    /// Visible channels in display order
    pub fn visible_channels(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.visible.iter().filter_map(|&i| self.channels.get(i))
    }

    /// Enter filter mode
    pub fn enter_filter_mode(&mut self) {
        self.input_mode = InputMode::Filter;
    }

    /// Enter command mode
    pub fn enter_command_mode(&mut self) {
        self.input_mode = InputMode::Command;
        self.command_input.clear();
    }

    /// Exit current input mode
    pub fn exit_input_mode(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    /// Clear the filter and show the whole lineup
    pub fn clear_filter(&mut self) {
        if !self.filter.is_empty() {
            self.filter.clear();
            self.apply_filter();
        }
    }

    /// Set status message
    pub fn set_status(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status_message = Some((message.into(), level));
    }

    /// Clear status message
    pub fn clear_status(&mut self) {
        self.status_message = None;
    }

    fn ensure_cursor_visible(&mut self) {
        if self.cursor < self.scroll_offset {
            self.scroll_offset = self.cursor;
        } else if self.cursor >= self.scroll_offset + self.visible_rows {
            self.scroll_offset = self.cursor - self.visible_rows + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channels() -> Vec<ChannelInfo> {
        (0..30)
            .map(|i| ChannelInfo {
                title: if i % 10 == 0 { format!("News {}", i) } else { format!("Channel {}", i) },
                number: Some(i + 1),
                id: format!("ch{}", i),
                logo: None,
            })
            .collect()
    }

    #[test]
    fn test_cursor_movement() {
        let mut state = RemoteState::new();
        state.set_channels(sample_channels());

        state.cursor_down();
        assert_eq!(state.cursor, 1);

        state.cursor_down();
        state.cursor_down();
        assert_eq!(state.cursor, 3);

        state.cursor_up();
        assert_eq!(state.cursor, 2);
        assert_eq!(state.current_channel().map(|c| c.id.as_str()), Some("ch2"));
    }

    #[test]
    fn test_scrolls_with_cursor() {
        let mut state = RemoteState::new();
        state.visible_rows = 5;
        state.set_channels(sample_channels());

        for _ in 0..7 {
            state.cursor_down();
        }
        assert_eq!(state.cursor, 7);
        assert_eq!(state.scroll_offset, 3);

        state.cursor_bottom();
        assert_eq!(state.cursor, 29);
        state.cursor_top();
        assert_eq!(state.scroll_offset, 0);
    }

    #[test]
    fn test_filter_narrows_list() {
        let mut state = RemoteState::new();
        state.set_channels(sample_channels());
        state.cursor_down();

        state.filter = "NEWS".to_string();
        state.apply_filter();
        assert_eq!(state.cursor, 0);
        let ids: Vec<&str> = state.visible_channels().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["ch0", "ch10", "ch20"]);

        state.cursor_down();
        assert_eq!(state.current_channel().map(|c| c.id.as_str()), Some("ch10"));

        state.clear_filter();
        assert_eq!(state.visible.len(), 30);
    }

    #[test]
    fn test_empty_lineup() {
        let mut state = RemoteState::new();
        state.cursor_down();
        state.cursor_bottom();
        assert_eq!(state.cursor, 0);
        assert!(state.current_channel().is_none());
    }
}
