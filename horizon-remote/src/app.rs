//! Application state and logic

use horizon_core::{
    ChannelInfo, Key, RealtimeChannel, Subscription,
    state::{RemoteState, StatusLevel},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Application result for main loop
pub enum AppResult {
    Continue,
    Quit,
}

/// Something to send to the box
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    /// Tune to a channel id
    Zap { id: String, title: String },
    Press(Key),
}

impl RemoteAction {
    fn label(&self) -> String {
        match self {
            RemoteAction::Zap { title, .. } => format!("Tuned to {}", title),
            RemoteAction::Press(key) => format!("Sent {}", key),
        }
    }
}

/// Outcome of a background task
#[derive(Debug)]
pub enum AppEvent {
    Connected(Result<(), String>),
    CommandDone { label: String, result: Result<(), String> },
}

/// Main application struct
pub struct App {
    /// UI state
    pub state: RemoteState,

    /// Connection to the household's boxes
    pub channel: RealtimeChannel,

    /// Inbound status reports
    updates: Subscription,

    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl App {
    pub fn new(channel: RealtimeChannel, household_id: String, channels: Vec<ChannelInfo>) -> Self {
        let mut state = RemoteState::new();
        state.household_id = Some(household_id);
        if channels.is_empty() {
            state.set_status("Channel lineup unavailable", StatusLevel::Warning);
        }
        state.set_channels(channels);

        let updates = channel.subscribe();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            state,
            channel,
            updates,
            events_tx,
            events_rx,
        }
    }

    /// Run the availability check in the background
    pub fn connect(&mut self) {
        self.state.set_status("Connecting...", StatusLevel::Info);

        let channel = self.channel.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = channel.ensure_connected().await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Connected(result));
        });
    }

    /// Send an action to the box in the background
    pub fn dispatch(&mut self, action: RemoteAction) {
        debug!("Dispatching {:?}", action);
        self.state.in_flight += 1;

        let channel = self.channel.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let label = action.label();
            let result = match action {
                RemoteAction::Zap { id, .. } => channel.set_channel(&id).await,
                RemoteAction::Press(key) => channel.send_key(key).await,
            };
            let _ = tx.send(AppEvent::CommandDone {
                label,
                result: result.map_err(|e| e.to_string()),
            });
        });
    }

    /// Zap to the channel under the cursor
    pub fn zap_selected(&mut self) {
        if let Some(channel) = self.state.current_channel() {
            let action = RemoteAction::Zap {
                id: channel.id.clone(),
                title: channel.title.clone(),
            };
            self.dispatch(action);
        }
    }

    /// Process background results and inbound messages
    pub fn tick(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }

        while let Some(message) = self.updates.try_recv() {
            if self.state.device.apply(&message) {
                self.state
                    .set_status(format!("Box power is {}", self.state.device.power), StatusLevel::Info);
            }
        }
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Connected(result) => {
                self.state.device.record_connect(&result);
                match result {
                    Ok(()) => self.state.set_status("Connected", StatusLevel::Success),
                    Err(e) => {
                        warn!("Connect failed: {}", e);
                        self.state.set_status(format!("Unavailable: {}", e), StatusLevel::Error);
                    }
                }
            }
            AppEvent::CommandDone { label, result } => {
                self.state.in_flight = self.state.in_flight.saturating_sub(1);
                match result {
                    Ok(()) => {
                        self.state.device.record_connect::<String>(&Ok(()));
                        self.state.set_status(label, StatusLevel::Success);
                    }
                    Err(e) => self.state.set_status(format!("Failed: {}", e), StatusLevel::Error),
                }
            }
        }
    }
}
