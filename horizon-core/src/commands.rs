//! Remote-control commands built on the realtime channel
//!
//! Success means the transport accepted the publish, nothing more: the box
//! does not acknowledge commands.

use std::fmt;

use serde_json::json;
use tracing::warn;

use crate::protocol::Command;
use crate::realtime::{ChannelError, RealtimeChannel};

/// Command type that tunes the box to a source
pub const PUSH_TO_TV: &str = "CPE.pushToTV";

/// Command type for a remote key press
pub const KEY_EVENT: &str = "CPE.KeyEvent";

/// Remote key, named after its W3C key value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// Toggles standby
    Power,
    MediaPause,
    Escape,
    Other(String),
}

impl Key {
    pub fn w3c_name(&self) -> &str {
        match self {
            Key::Power => "Power",
            Key::MediaPause => "MediaPause",
            Key::Escape => "Escape",
            Key::Other(name) => name,
        }
    }

    /// Parse a key name, case-insensitive for the built-in keys
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "power" => Key::Power,
            "mediapause" | "pause" => Key::MediaPause,
            "escape" | "back" => Key::Escape,
            _ => Key::Other(name.to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.w3c_name())
    }
}

/// Tune to a linear channel from its start, at normal speed
pub fn channel_command(channel_id: &str) -> Command {
    Command::new(
        PUSH_TO_TV,
        json!({
            "sourceType": "linear",
            "source": { "channelId": channel_id },
            "relativePosition": 0,
            "speed": 1,
        }),
    )
}

/// Press and release a key
pub fn key_command(key: &Key) -> Command {
    Command::new(
        KEY_EVENT,
        json!({
            "w3cKey": key.w3c_name(),
            "eventType": "keyDownUp",
        }),
    )
}

impl RealtimeChannel {
    pub async fn set_channel(&self, channel_id: &str) -> Result<(), ChannelError> {
        self.publish(channel_command(channel_id)).await
    }

    pub async fn send_key(&self, key: Key) -> Result<(), ChannelError> {
        self.publish(key_command(&key)).await.inspect_err(|e| {
            warn!("Key {} not delivered: {}", key, e);
        })
    }

    pub async fn toggle_power(&self) -> Result<(), ChannelError> {
        self.send_key(Key::Power).await
    }

    pub async fn pause(&self) -> Result<(), ChannelError> {
        self.send_key(Key::MediaPause).await
    }

    pub async fn escape(&self) -> Result<(), ChannelError> {
        self.send_key(Key::Escape).await
    }
}
