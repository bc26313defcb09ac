//! Wire types for the realtime channel
//!
//! All message bodies are UTF-8 JSON. Inbound messages are state reports
//! published by devices on the account; outbound commands are addressed to
//! a single set-top box topic.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Device type reported by set-top boxes
pub const DEVICE_TYPE_STB: &str = "STB";

/// State reported by a box that is online and accepting commands
pub const STATE_ONLINE_RUNNING: &str = "ONLINE_RUNNING";

/// Inbound payload that could not be decoded
#[derive(Debug, Error)]
#[error("Malformed inbound payload: {0}")]
pub struct ParseError(#[from] serde_json::Error);

/// State report received on one of the subscribed topics.
///
/// Any JSON object is accepted; the well-known fields read as `None` when
/// missing or not a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    /// Address of the reporting device
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Remaining server fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

impl InboundMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn is_set_top_box(&self) -> bool {
        self.device_type.as_deref() == Some(DEVICE_TYPE_STB)
    }

    /// Source of a set-top box report, if this is one
    pub fn set_top_box_source(&self) -> Option<&str> {
        if self.is_set_top_box() {
            self.source.as_deref()
        } else {
            None
        }
    }

    /// True when this message proves the box is reachable
    pub fn is_readiness_signal(&self) -> bool {
        self.is_set_top_box() && self.state.as_deref() == Some(STATE_ONLINE_RUNNING)
    }
}

/// Caller-supplied part of an outbound command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command type, e.g. `CPE.KeyEvent`
    pub kind: String,
    pub status: Value,
    /// Fields merged over the default source block
    pub source: Map<String, Value>,
}

impl Command {
    pub fn new(kind: impl Into<String>, status: Value) -> Self {
        Self {
            kind: kind.into(),
            status,
            source: Map::new(),
        }
    }

    pub fn with_source_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.source.insert(key.into(), value.into());
        self
    }
}

/// Command as published on the wire. Built fresh for every publish.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: Map<String, Value>,
    pub status: Value,
}

impl OutboundCommand {
    pub fn new(client_id: &str, client_label: &str, command: Command) -> Self {
        let mut source = Map::new();
        source.insert("clientId".to_string(), Value::from(client_id));
        source.insert("friendlyDeviceName".to_string(), Value::from(client_label));
        source.extend(command.source);

        Self {
            id: random_id(crate::COMMAND_ID_LEN),
            kind: command.kind,
            source,
            status: command.status,
        }
    }
}

/// Random alphanumeric identifier
pub fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Topic helpers, all scoped by the account (household) id
pub mod topics {
    /// Account-wide topic
    pub fn account(account_id: &str) -> String {
        account_id.to_string()
    }

    /// Wildcard status topic covering every device on the account
    pub fn device_status(account_id: &str) -> String {
        format!("{}/+/status", account_id)
    }

    /// Command topic of a single device
    pub fn device(account_id: &str, device_id: &str) -> String {
        format!("{}/{}", account_id, device_id)
    }
}
