//! Device status as seen by a front-end
//!
//! Availability follows the outcome of the last connect attempt; power
//! follows the state strings set-top boxes publish.

use std::fmt;

use crate::protocol::InboundMessage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Availability {
    #[default]
    Unknown,
    Available,
    /// Carries the error that made the device unreachable
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PowerState {
    #[default]
    Unknown,
    On,
    Off,
}

impl PowerState {
    /// Map a set-top box state string. Standby counts as off.
    pub fn from_box_state(state: &str) -> Option<Self> {
        if state.starts_with("ONLINE_STANDBY") || state.starts_with("OFFLINE") {
            Some(PowerState::Off)
        } else if state.starts_with("ONLINE") {
            Some(PowerState::On)
        } else {
            None
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::Unknown => f.write_str("?"),
            PowerState::On => f.write_str("on"),
            PowerState::Off => f.write_str("off"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    pub availability: Availability,
    pub power: PowerState,
    /// Last raw state reported by the box
    pub last_state: Option<String>,
}

impl DeviceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// Record the outcome of an init or availability check
    pub fn record_connect<E: fmt::Display>(&mut self, result: &Result<(), E>) {
        self.availability = match result {
            Ok(()) => Availability::Available,
            Err(e) => Availability::Unavailable(e.to_string()),
        };
    }

    /// Apply an inbound message. Returns true if the power state changed.
    pub fn apply(&mut self, message: &InboundMessage) -> bool {
        if !message.is_set_top_box() {
            return false;
        }
        let Some(state) = message.state.as_deref() else {
            return false;
        };

        self.last_state = Some(state.to_string());
        match PowerState::from_box_state(state) {
            Some(power) if power != self.power => {
                self.power = power;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(device_type: &str, state: &str) -> InboundMessage {
        InboundMessage::parse(format!(r#"{{"deviceType":"{}","state":"{}"}}"#, device_type, state).as_bytes())
            .unwrap()
    }

    #[test]
    fn test_power_mapping() {
        assert_eq!(PowerState::from_box_state("ONLINE_RUNNING"), Some(PowerState::On));
        assert_eq!(PowerState::from_box_state("ONLINE_STANDBY"), Some(PowerState::Off));
        assert_eq!(PowerState::from_box_state("ONLINE_STANDBY_LOWPOWER"), Some(PowerState::Off));
        assert_eq!(PowerState::from_box_state("OFFLINE_NETWORK_STANDBY"), Some(PowerState::Off));
        assert_eq!(PowerState::from_box_state("UPGRADING"), None);
    }

    #[test]
    fn test_apply_tracks_box_only() {
        let mut status = DeviceStatus::new();

        assert!(status.apply(&report("STB", "ONLINE_RUNNING")));
        assert_eq!(status.power, PowerState::On);
        assert!(!status.apply(&report("STB", "ONLINE_RUNNING")));

        assert!(!status.apply(&report("APP", "OFFLINE")));
        assert_eq!(status.power, PowerState::On);

        assert!(status.apply(&report("STB", "ONLINE_STANDBY")));
        assert_eq!(status.power, PowerState::Off);
        assert_eq!(status.last_state.as_deref(), Some("ONLINE_STANDBY"));
    }

    #[test]
    fn test_availability_follows_connect_outcome() {
        let mut status = DeviceStatus::new();
        assert_eq!(status.availability, Availability::Unknown);

        status.record_connect::<String>(&Err("Invalid credentials".to_string()));
        assert_eq!(status.availability, Availability::Unavailable("Invalid credentials".to_string()));
        assert!(!status.is_available());

        status.record_connect::<String>(&Ok(()));
        assert!(status.is_available());
    }
}
