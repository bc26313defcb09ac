//! Realtime channel: the single persistent pub/sub connection of a client
//!
//! ```text
//!  Idle ──ensure_connected──> Connecting ──subscribed + ONLINE_RUNNING──> Ready
//!   ^                             │                                        │
//!   └──── auth/connect failure ───┘                                        │
//!   └──────────────────────── close event / destroy ───────────────────────┘
//! ```
//!
//! The handshake is strictly ordered: session, token, transport connect
//! (bounded by the connect timeout), both subscriptions, then the first
//! `ONLINE_RUNNING` report from a set-top box. The subscribe acks and the
//! readiness report are waited for without a bound unless a handshake
//! timeout is configured, so a box that never reports running keeps
//! `ensure_connected` pending.
//!
//! The channel never reconnects on its own. A close clears every secret and
//! the device identity; the next `ensure_connected` runs the full handshake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::protocol::{self, Command, InboundMessage, OutboundCommand, topics};
use crate::session::{AuthError, Session, SessionManager};
use crate::transport::{ConnectOptions, Connector, EventStream, Link, MqttConnector, TransportError, TransportEvent};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Broker did not accept the connection within {0:?}")]
    Timeout(Duration),

    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("No set-top box known to address")]
    NoTarget,

    #[error("Publish not acknowledged: {0}")]
    Nack(TransportError),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Error returned by every channel and command operation
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Ready,
}

/// Tunables of a channel
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Origin label placed in outbound commands
    pub client_label: String,
    pub connect_timeout: Duration,
    /// Bound on subscribe acks and the readiness report; `None` waits forever
    pub handshake_timeout: Option<Duration>,
}

impl From<&ServiceConfig> for ChannelOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            client_label: config.client_label.clone(),
            connect_timeout: config.connect_timeout(),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

/// Signals from the event pump to an in-flight handshake
#[derive(Debug)]
enum Handshake {
    Connected,
    Subscribed { granted: bool },
    Ready,
    Closed,
}

#[derive(Default)]
struct LinkState {
    phase: Phase,
    /// Bumped on every connect attempt and teardown; stale pumps compare against it
    generation: u64,
    link: Option<Arc<dyn Link>>,
    account_id: Option<String>,
    active_device: Option<String>,
    handshake: Option<mpsc::UnboundedSender<Handshake>>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<InboundMessage>>,
}

struct Inner {
    options: ChannelOptions,
    client_id: String,
    connector: Arc<dyn Connector>,
    sessions: tokio::sync::Mutex<SessionManager>,
    /// Held for the whole of a connect attempt
    connect_lock: tokio::sync::Mutex<()>,
    state: Mutex<LinkState>,
    listeners: Arc<Mutex<Listeners>>,
}

/// Observer handle returned by [`RealtimeChannel::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    registry: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Next inbound message; `None` once the channel is destroyed
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).senders.remove(&self.id);
        }
    }
}

/// Realtime channel handle. Clones share the same connection.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

impl RealtimeChannel {
    /// Channel over the configured MQTT broker
    pub fn new(config: &ServiceConfig, sessions: SessionManager) -> Self {
        let connector = MqttConnector::new(&config.broker_url, config.keep_alive());
        Self::with_connector(ChannelOptions::from(config), sessions, Arc::new(connector))
    }

    pub fn with_connector(options: ChannelOptions, sessions: SessionManager, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                client_id: protocol::random_id(crate::CLIENT_ID_LEN),
                connector,
                sessions: tokio::sync::Mutex::new(sessions),
                connect_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(LinkState::default()),
                listeners: Arc::new(Mutex::new(Listeners::default())),
            }),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock_state().phase
    }

    /// Set-top box currently addressed by commands
    pub fn active_device(&self) -> Option<String> {
        self.inner.lock_state().active_device.clone()
    }

    /// Household id of the current connection
    pub fn account_id(&self) -> Option<String> {
        self.inner.lock_state().account_id.clone()
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.sessions.lock().await.session().cloned()
    }

    pub async fn has_session(&self) -> bool {
        self.inner.sessions.lock().await.session().is_some()
    }

    pub async fn has_token(&self) -> bool {
        self.inner.sessions.lock().await.token().is_some()
    }

    /// Register an observer for every successfully parsed inbound message
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut listeners = lock(&self.inner.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.senders.insert(id, sender);

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.inner.listeners),
        }
    }

    /// Bring the channel to Ready, joining an attempt already in flight
    pub async fn ensure_connected(&self) -> Result<(), ChannelError> {
        if self.phase() == Phase::Ready {
            return Ok(());
        }

        let _attempt = self.inner.connect_lock.lock().await;
        if self.phase() == Phase::Ready {
            return Ok(());
        }

        self.connect().await
    }

    /// Publish a command to the active set-top box
    pub async fn publish(&self, command: Command) -> Result<(), ChannelError> {
        self.ensure_connected().await?;

        let (link, topic) = {
            let state = self.inner.lock_state();
            let device = state.active_device.as_deref().ok_or(PublishError::NoTarget)?;
            let account = state.account_id.as_deref().ok_or(PublishError::NoTarget)?;
            let link = state
                .link
                .clone()
                .ok_or(PublishError::Nack(TransportError::Closed))?;
            (link, topics::device(account, device))
        };

        let outbound = OutboundCommand::new(&self.inner.client_id, &self.inner.options.client_label, command);
        let payload = serde_json::to_vec(&outbound).map_err(PublishError::Encode)?;

        debug!("Publishing {} ({}) to {}", outbound.kind, outbound.id, topic);
        link.publish(&topic, payload).await.map_err(PublishError::Nack)?;
        Ok(())
    }

    /// Tear everything down. Safe to call in any phase.
    pub async fn destroy(&self) {
        let mut sessions = self.inner.sessions.lock().await;
        let (link, handshake) = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.phase = Phase::Idle;
            state.account_id = None;
            state.active_device = None;
            (state.link.take(), state.handshake.take())
        };
        sessions.invalidate();
        drop(sessions);

        if let Some(handshake) = handshake {
            let _ = handshake.send(Handshake::Closed);
        }
        if let Some(link) = link {
            info!("Destroying realtime channel");
            link.disconnect().await;
        }

        lock(&self.inner.listeners).senders.clear();
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        let (signals_tx, mut signals) = mpsc::unbounded_channel();

        // Registered under the sessions lock: a destroy that follows the token
        // fetch always supersedes this attempt.
        let (account_id, token, generation) = {
            let mut sessions = self.inner.sessions.lock().await;
            let account_id = sessions.ensure_session().await?.household_id.clone();
            let token = sessions.ensure_token().await?.as_str().to_string();

            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.phase = Phase::Connecting;
            state.account_id = Some(account_id.clone());
            state.active_device = None;
            state.handshake = Some(signals_tx.clone());
            (account_id, token, state.generation)
        };

        info!("Connecting realtime channel for household {}", account_id);

        let options = ConnectOptions {
            client_id: self.inner.client_id.clone(),
            username: account_id.clone(),
            password: token,
        };

        if !self.inner.is_current(generation) {
            debug!("Connect attempt superseded before reaching the broker");
            return Err(ConnectError::Transport(TransportError::Closed).into());
        }

        let result = match self.inner.connector.connect(options).await {
            Ok((link, events)) => {
                if self.inner.attach(generation, Arc::clone(&link)) {
                    tokio::spawn(pump(Arc::downgrade(&self.inner), generation, events, signals_tx));
                    self.handshake(link.as_ref(), &account_id, &mut signals).await
                } else {
                    link.disconnect().await;
                    Err(TransportError::Closed.into())
                }
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) if self.inner.mark_ready(generation) => {
                info!("Realtime channel ready for household {}", account_id);
                Ok(())
            }
            Ok(()) => Err(ConnectError::Transport(TransportError::Closed).into()),
            Err(e) => {
                warn!("Realtime connect failed: {}", e);
                self.inner.abort_attempt(generation).await;
                Err(e.into())
            }
        }
    }

    async fn handshake(
        &self,
        link: &dyn Link,
        account_id: &str,
        signals: &mut mpsc::UnboundedReceiver<Handshake>,
    ) -> Result<(), ConnectError> {
        let limit = self.inner.options.connect_timeout;
        match tokio::time::timeout(limit, wait_connected(signals)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectError::Timeout(limit)),
        }

        let subscriptions = [topics::account(account_id), topics::device_status(account_id)];
        for topic in &subscriptions {
            link.subscribe(topic)
                .await
                .map_err(|e| ConnectError::SubscribeFailed(format!("{}: {}", topic, e)))?;
            debug!("Subscribed to {}", topic);
        }

        let settle = wait_settled(signals, subscriptions.len());
        match self.inner.options.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, settle)
                .await
                .map_err(|_| ConnectError::Timeout(limit))?,
            None => settle.await,
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        lock(&self.state)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    fn attach(&self, generation: u64, link: Arc<dyn Link>) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        state.link = Some(link);
        true
    }

    fn mark_ready(&self, generation: u64) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation || state.link.is_none() {
            return false;
        }
        state.phase = Phase::Ready;
        state.handshake = None;
        true
    }

    /// Release a failed attempt. The session survives; only the token is refetched.
    async fn abort_attempt(&self, generation: u64) {
        let mut sessions = self.sessions.lock().await;
        let link = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            state.phase = Phase::Idle;
            state.account_id = None;
            state.active_device = None;
            state.handshake = None;
            state.link.take()
        };
        sessions.invalidate_token();
        drop(sessions);

        if let Some(link) = link {
            link.disconnect().await;
        }
    }

    async fn handle_close(&self, generation: u64) {
        let mut sessions = self.sessions.lock().await;
        let link = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            state.phase = Phase::Idle;
            state.account_id = None;
            state.active_device = None;
            state.handshake = None;
            state.link.take()
        };
        sessions.invalidate();
        drop(sessions);

        info!("Realtime channel closed; session, token and device cleared");
        if let Some(link) = link {
            link.disconnect().await;
        }
    }

    /// Parse and dispatch one inbound payload. Returns true for a readiness report.
    fn route(&self, generation: u64, topic: &str, payload: &[u8]) -> bool {
        let message = match InboundMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping payload on {}: {}", topic, e);
                return false;
            }
        };

        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return false;
            }
            if let Some(source) = message.set_top_box_source() {
                if state.active_device.as_deref() != Some(source) {
                    debug!("Active set-top box is now {}", source);
                }
                state.active_device = Some(source.to_string());
            }
        }

        let ready = message.is_readiness_signal();
        lock(&self.listeners)
            .senders
            .retain(|_, sender| sender.send(message.clone()).is_ok());
        ready
    }
}

/// Forward transport events of one connection until it closes
async fn pump(
    inner: Weak<Inner>,
    generation: u64,
    mut events: EventStream,
    signals: mpsc::UnboundedSender<Handshake>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        match event {
            TransportEvent::Connected => {
                debug!("Broker accepted connection");
                let _ = signals.send(Handshake::Connected);
            }
            TransportEvent::SubscribeAck { granted } => {
                let _ = signals.send(Handshake::Subscribed { granted });
            }
            TransportEvent::Message { topic, payload } => {
                if inner.route(generation, &topic, &payload) {
                    let _ = signals.send(Handshake::Ready);
                }
            }
            TransportEvent::Error(reason) => {
                warn!("Transport error: {}", reason);
            }
            TransportEvent::Closed => {
                inner.handle_close(generation).await;
                let _ = signals.send(Handshake::Closed);
                return;
            }
        }
    }

    // Stream ended without an explicit close
    if let Some(inner) = inner.upgrade() {
        inner.handle_close(generation).await;
    }
    let _ = signals.send(Handshake::Closed);
}

async fn wait_connected(signals: &mut mpsc::UnboundedReceiver<Handshake>) -> Result<(), ConnectError> {
    loop {
        match signals.recv().await {
            Some(Handshake::Connected) => return Ok(()),
            Some(Handshake::Closed) | None => return Err(TransportError::Closed.into()),
            Some(_) => {}
        }
    }
}

async fn wait_settled(
    signals: &mut mpsc::UnboundedReceiver<Handshake>,
    expected_acks: usize,
) -> Result<(), ConnectError> {
    let mut acks = 0;
    let mut ready = false;

    while acks < expected_acks || !ready {
        match signals.recv().await {
            Some(Handshake::Subscribed { granted: true }) => acks += 1,
            Some(Handshake::Subscribed { granted: false }) => {
                return Err(ConnectError::SubscribeFailed("broker refused subscription".to_string()));
            }
            Some(Handshake::Ready) => ready = true,
            Some(Handshake::Connected) => {}
            Some(Handshake::Closed) | None => return Err(TransportError::Closed.into()),
        }
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
