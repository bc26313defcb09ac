//! Pub/sub transport seam
//!
//! The realtime channel talks to the broker through [`Connector`] and
//! [`Link`]. [`MqttConnector`] is the production implementation: MQTT over
//! secure WebSocket via `rumqttc`, QoS 0 throughout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode, Transport};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Broker request failed: {0}")]
    Request(String),

    #[error("Invalid broker options: {0}")]
    Options(String),
}

/// Events reported by an open connection, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker accepted the connection
    Connected,
    /// Broker answered a subscribe request
    SubscribeAck { granted: bool },
    /// Inbound publish
    Message { topic: String, payload: Vec<u8> },
    /// Transport-level error; the connection may still recover
    Error(String),
    /// Connection is gone; no further events follow
    Closed,
}

/// Identity and secrets for one connection attempt
#[derive(Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Opens broker connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: ConnectOptions) -> Result<(Arc<dyn Link>, EventStream), TransportError>;
}

/// Handle to one open connection
#[async_trait]
pub trait Link: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

/// MQTT over WebSocket connector
#[derive(Debug, Clone)]
pub struct MqttConnector {
    broker_url: String,
    keep_alive: Duration,
}

impl MqttConnector {
    pub fn new(broker_url: &str, keep_alive: Duration) -> Self {
        Self {
            broker_url: broker_url.to_string(),
            keep_alive,
        }
    }

    fn mqtt_options(&self, options: ConnectOptions) -> Result<MqttOptions, TransportError> {
        let url = reqwest::Url::parse(&self.broker_url).map_err(|e| TransportError::Options(e.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::Options(format!("no port in {}", self.broker_url)))?;

        let transport = match url.scheme() {
            "wss" => Transport::wss_with_default_config(),
            "ws" => Transport::Ws,
            other => return Err(TransportError::Options(format!("unsupported scheme {}", other))),
        };

        // For websocket transports rumqttc takes the full URL as the host
        let mut mqtt = MqttOptions::new(options.client_id, self.broker_url.as_str(), port);
        mqtt.set_transport(transport);
        mqtt.set_credentials(options.username, options.password);
        mqtt.set_keep_alive(self.keep_alive);
        mqtt.set_clean_session(true);
        Ok(mqtt)
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<(Arc<dyn Link>, EventStream), TransportError> {
        debug!("Opening broker connection to {} as {}", self.broker_url, options.client_id);

        let mqtt = self.mqtt_options(options)?;
        let (client, eventloop) = AsyncClient::new(mqtt, 16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(drive(eventloop, events_tx));

        Ok((Arc::new(MqttLink { client }), events_rx))
    }
}

/// Poll the rumqttc event loop and translate packets into transport events
async fn drive(mut eventloop: EventLoop, events: mpsc::UnboundedSender<TransportEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => TransportEvent::Connected,
            Ok(Event::Incoming(Packet::SubAck(ack))) => TransportEvent::SubscribeAck {
                granted: ack
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure)),
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Incoming(Packet::Disconnect)) => {
                let _ = events.send(TransportEvent::Closed);
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                // A poll error means the socket is gone; rumqttc would reconnect on the
                // next poll, but reconnection is driven by the channel instead.
                let _ = events.send(TransportEvent::Error(e.to_string()));
                let _ = events.send(TransportEvent::Closed);
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}

struct MqttLink {
    client: AsyncClient,
}

#[async_trait]
impl Link for MqttLink {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConnectOptions {
        ConnectOptions {
            client_id: "client".to_string(),
            username: "H1".to_string(),
            password: "T1".to_string(),
        }
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let connector = MqttConnector::new("tcp://broker:1883", Duration::from_secs(30));
        let result = connector.mqtt_options(options());
        assert!(matches!(result, Err(TransportError::Options(_))));
    }

    #[test]
    fn test_websocket_options() {
        let connector = MqttConnector::new("ws://localhost:8080/mqtt", Duration::from_secs(30));
        let mqtt = connector.mqtt_options(options()).unwrap();
        assert_eq!(mqtt.client_id(), "client");
        assert_eq!(mqtt.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_connect_options_debug_redacts_password() {
        let rendered = format!("{:?}", options());
        assert!(!rendered.contains("T1"));
    }
}
