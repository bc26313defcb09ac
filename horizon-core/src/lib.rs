//! horizon-core: client library for the Horizon set-top box cloud
//!
//! This crate provides:
//! - Session management (credentials -> account session -> connection token)
//! - The realtime channel: one MQTT-over-WebSocket connection per client
//! - Remote-control commands (channel change, key presses)
//! - Channel lineup lookup and a device status model for front-ends

pub mod commands;
pub mod config;
pub mod device;
pub mod lineup;
pub mod protocol;
pub mod realtime;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::Key;
pub use config::Config;
pub use device::{Availability, DeviceStatus, PowerState};
pub use lineup::ChannelInfo;
pub use protocol::{InboundMessage, OutboundCommand};
pub use realtime::{ChannelError, Phase, RealtimeChannel, Subscription};
pub use session::{AuthError, Credentials, Session, SessionManager};

/// Length of the generated client identity
pub const CLIENT_ID_LEN: usize = 30;

/// Length of the per-command id
pub const COMMAND_ID_LEN: usize = 8;
