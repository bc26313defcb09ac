//! Test doubles: an in-process vendor backend and a scripted broker

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::config::{LineupConfig, ServiceConfig};
use crate::realtime::{ChannelOptions, RealtimeChannel};
use crate::session::{Credentials, SessionManager};
use crate::transport::{ConnectOptions, Connector, EventStream, Link, TransportError, TransportEvent};

pub(crate) const USERNAME: &str = "viewer@example.com";
pub(crate) const PASSWORD: &str = "correct horse";
pub(crate) const BOX_ID: &str = "3C36E4-EOSSTB-003656579806";

#[derive(Default)]
struct BackendState {
    authorize_hits: AtomicUsize,
    token_hits: AtomicUsize,
    channel_hits: AtomicUsize,
    authorize_fails: AtomicBool,
    reject_tokens: AtomicBool,
    channels_fail: AtomicBool,
    token_delay_ms: AtomicU64,
}

/// Authorization, token and lineup endpoints on 127.0.0.1
pub(crate) struct FakeBackend {
    base_url: String,
    state: Arc<BackendState>,
}

impl FakeBackend {
    pub(crate) async fn spawn() -> Self {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/auth-service/v1/authorization", post(authorize))
            .route("/auth-service/v1/mqtt/token", get(token))
            .route("/linear-service/v2/channels", get(channels))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub(crate) fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            session_url: format!("{}/auth-service/v1/authorization", self.base_url),
            token_url: format!("{}/auth-service/v1/mqtt/token", self.base_url),
            broker_url: "ws://127.0.0.1:9/mqtt".to_string(),
            http_timeout_secs: 5,
            ..ServiceConfig::default()
        }
    }

    pub(crate) fn lineup_config(&self) -> LineupConfig {
        LineupConfig {
            channels_url: format!("{}/linear-service/v2/channels", self.base_url),
            ..LineupConfig::default()
        }
    }

    pub(crate) fn credentials(&self) -> Credentials {
        Credentials::new(USERNAME, PASSWORD)
    }

    pub(crate) fn authorize_hits(&self) -> usize {
        self.state.authorize_hits.load(Ordering::SeqCst)
    }

    pub(crate) fn token_hits(&self) -> usize {
        self.state.token_hits.load(Ordering::SeqCst)
    }

    pub(crate) fn channel_hits(&self) -> usize {
        self.state.channel_hits.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_authorize_with_server_error(&self) {
        self.state.authorize_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reject_tokens(&self) {
        self.state.reject_tokens.store(true, Ordering::SeqCst);
    }

    /// Hold every token response for `delay` before answering
    pub(crate) fn delay_tokens(&self, delay: Duration) {
        self.state.token_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn fail_channels(&self) {
        self.state.channels_fail.store(true, Ordering::SeqCst);
    }
}

async fn authorize(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.authorize_hits.fetch_add(1, Ordering::SeqCst);

    if state.authorize_fails.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let device_code = headers.get("x-device-code").map(|v| v.as_bytes());
    if device_code != Some(b"web".as_slice()) {
        return (StatusCode::BAD_REQUEST, Json(json!([{"code": "missingDeviceCode"}]))).into_response();
    }

    if body["username"] == USERNAME && body["password"] == PASSWORD {
        Json(json!({
            "householdId": "H1",
            "accessToken": "A1",
            "username": USERNAME,
            "locale": "nl",
        }))
        .into_response()
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(json!([{"code": "invalidCredentials", "reason": "wrong password"}])),
        )
            .into_response()
    }
}

async fn token(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);

    let delay = state.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let access = headers.get("X-OESP-Token").map(|v| v.as_bytes());
    let username = headers.get("X-OESP-Username").map(|v| v.as_bytes());
    if state.reject_tokens.load(Ordering::SeqCst)
        || access != Some(b"A1".as_slice())
        || username != Some(USERNAME.as_bytes())
    {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({"token": "T1"})).into_response()
}

async fn channels(State(state): State<Arc<BackendState>>, Query(query): Query<HashMap<String, String>>) -> Response {
    state.channel_hits.fetch_add(1, Ordering::SeqCst);

    if state.channels_fail.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let expected = [("cityId", "65535"), ("language", "nl"), ("productClass", "Orion-DASH")];
    if expected
        .iter()
        .any(|(key, value)| query.get(*key).map(String::as_str) != Some(*value))
    {
        return StatusCode::BAD_REQUEST.into_response();
    }

    Json(json!([
        {
            "id": "NL_000001_019401",
            "name": "NPO 1",
            "logicalChannelNumber": 1,
            "logo": {"focused": "https://static.example/npo1.png"},
            "isHidden": false
        },
        {
            "id": "NL_000002_019402",
            "name": "NPO 2",
            "logicalChannelNumber": 2,
            "logo": {"focused": "https://static.example/npo2.png"}
        },
        {
            "id": "NL_000007_019405",
            "name": "RTL 4",
            "logicalChannelNumber": 4,
            "logo": {"focused": "https://static.example/rtl4.png"}
        }
    ]))
    .into_response()
}

/// How a fake broker answers a connect attempt
#[derive(Clone, Copy)]
enum Script {
    /// Connect, grant subscriptions, then report a running box
    Running { with_source: bool },
    /// Connect and grant subscriptions; inbound traffic is driven by the test
    Manual,
    /// Never acknowledge the connection
    Silent,
    /// Connect but refuse subscriptions
    Refusing,
}

pub(crate) struct FakeBroker {
    script: Script,
    attempts: AtomicUsize,
    links: Mutex<Vec<Arc<FakeLink>>>,
    options: Mutex<Vec<ConnectOptions>>,
}

impl FakeBroker {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            attempts: AtomicUsize::new(0),
            links: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn new() -> Self {
        Self::scripted(Script::Running { with_source: true })
    }

    pub(crate) fn ready_without_source() -> Self {
        Self::scripted(Script::Running { with_source: false })
    }

    pub(crate) fn manual() -> Self {
        Self::scripted(Script::Manual)
    }

    pub(crate) fn silent() -> Self {
        Self::scripted(Script::Silent)
    }

    pub(crate) fn refusing_subscriptions() -> Self {
        Self::scripted(Script::Refusing)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub(crate) fn last_link(&self) -> Arc<FakeLink> {
        Arc::clone(self.links.lock().unwrap().last().expect("no connection opened"))
    }

    pub(crate) fn last_options(&self) -> ConnectOptions {
        self.options.lock().unwrap().last().cloned().expect("no connection opened")
    }
}

#[async_trait]
impl Connector for FakeBroker {
    async fn connect(&self, options: ConnectOptions) -> Result<(Arc<dyn Link>, EventStream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(options);

        let (events, stream) = mpsc::unbounded_channel();
        let link = Arc::new(FakeLink {
            events,
            script: self.script,
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            fail_publishes: AtomicBool::new(false),
        });

        if !matches!(self.script, Script::Silent) {
            link.emit(TransportEvent::Connected);
        }

        self.links.lock().unwrap().push(Arc::clone(&link));
        Ok((link, stream))
    }
}

pub(crate) struct FakeLink {
    events: mpsc::UnboundedSender<TransportEvent>,
    script: Script,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    disconnected: AtomicBool,
    fail_publishes: AtomicBool,
}

impl FakeLink {
    pub(crate) fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn emit_json(&self, value: Value) {
        self.emit(TransportEvent::Message {
            topic: format!("H1/{}/status", BOX_ID),
            payload: serde_json::to_vec(&value).unwrap(),
        });
    }

    pub(crate) fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub(crate) fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_publishes(&self) {
        self.fail_publishes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let count = {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            subscriptions.push(topic.to_string());
            subscriptions.len()
        };

        self.emit(TransportEvent::SubscribeAck {
            granted: !matches!(self.script, Script::Refusing),
        });

        if let Script::Running { with_source } = self.script {
            if count == 2 {
                let mut report = json!({"deviceType": "STB", "state": "ONLINE_RUNNING"});
                if with_source {
                    report["source"] = json!(BOX_ID);
                }
                self.emit_json(report);
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Request("outgoing queue closed".to_string()));
        }
        self.published.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// Channel wired to a fresh fake backend and the given broker
pub(crate) async fn harness(broker: &Arc<FakeBroker>) -> (RealtimeChannel, FakeBackend) {
    harness_with_password(broker, PASSWORD).await
}

pub(crate) async fn harness_with_password(broker: &Arc<FakeBroker>, password: &str) -> (RealtimeChannel, FakeBackend) {
    let backend = FakeBackend::spawn().await;
    let config = backend.service_config();
    let sessions = SessionManager::new(&config, Credentials::new(USERNAME, password)).unwrap();

    let options = ChannelOptions {
        connect_timeout: Duration::from_millis(500),
        ..ChannelOptions::from(&config)
    };
    let connector: Arc<dyn Connector> = broker.clone();
    (RealtimeChannel::with_connector(options, sessions, connector), backend)
}

/// Poll a condition until it holds, failing the test after two seconds
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within two seconds");
}
