//! Account session and connection token handling
//!
//! Two lazily resolved secrets:
//! - Session: obtained from username/password, identifies the household
//! - Token: short-lived, scoped to the session, authenticates the realtime channel
//!
//! Neither has a local expiry clock. They are dropped when a dependent call
//! fails or the connection closes, and fetched again on next use.

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ServiceConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token fetch failed: {0}")]
    TokenFetchFailed(String),

    #[error("Unexpected authorization response: {0}")]
    Unexpected(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Username and password, held in memory only
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authorization result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub household_id: String,
    pub access_token: String,
    /// Other server fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Opaque secret for the realtime connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionToken(String);

impl ConnectionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionToken(<redacted>)")
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Error entry in a rejected authorization body
#[derive(Debug, Deserialize)]
struct ErrorEntry {
    code: Option<String>,
}

/// Session manager: credentials -> session -> token
pub struct SessionManager {
    client: Client,
    session_url: String,
    token_url: String,
    device_code: String,
    credentials: Credentials,
    session: Option<Session>,
    token: Option<ConnectionToken>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("credentials", &self.credentials)
            .field("has_session", &self.session.is_some())
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl SessionManager {
    pub fn new(config: &ServiceConfig, credentials: Credentials) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(config.http_timeout()).build()?;

        Ok(Self {
            client,
            session_url: config.session_url.clone(),
            token_url: config.token_url.clone(),
            device_code: config.device_code.clone(),
            credentials,
            session: None,
            token: None,
        })
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn token(&self) -> Option<&ConnectionToken> {
        self.token.as_ref()
    }

    /// Exchange credentials for a session and keep it
    pub async fn get_session(&mut self) -> Result<&Session, AuthError> {
        #[derive(Serialize)]
        struct AuthorizeRequest<'a> {
            username: &'a str,
            password: &'a str,
        }

        debug!("Requesting session for {}", self.credentials.username);

        let resp = self
            .client
            .post(&self.session_url)
            .header("x-device-code", &self.device_code)
            .json(&AuthorizeRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            if is_invalid_credentials(&body) {
                return Err(AuthError::InvalidCredentials);
            }
            return Err(AuthError::Unexpected(status_text(status)));
        }

        let session: Session = resp.json().await?;
        info!("Session established for household {}", session.household_id);

        Ok(&*self.session.insert(session))
    }

    pub async fn ensure_session(&mut self) -> Result<&Session, AuthError> {
        if self.session.is_none() {
            self.get_session().await?;
        }
        self.session
            .as_ref()
            .ok_or_else(|| AuthError::Unexpected("session missing after fetch".to_string()))
    }

    /// Fetch a connection token for the held session, authorizing first if needed
    pub async fn get_token(&mut self) -> Result<&ConnectionToken, AuthError> {
        let access_token = self.ensure_session().await?.access_token.clone();

        debug!("Requesting connection token");

        let resp = self
            .client
            .get(&self.token_url)
            .header("X-OESP-Token", access_token)
            .header("X-OESP-Username", &self.credentials.username)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::TokenFetchFailed(status_text(status)));
        }

        let TokenResponse { token } = resp.json().await?;
        Ok(&*self.token.insert(ConnectionToken(token)))
    }

    pub async fn ensure_token(&mut self) -> Result<&ConnectionToken, AuthError> {
        if self.token.is_none() {
            self.get_token().await?;
        }
        self.token
            .as_ref()
            .ok_or_else(|| AuthError::TokenFetchFailed("token missing after fetch".to_string()))
    }

    /// Drop only the token; the next connect fetches a fresh one under the same session
    pub fn invalidate_token(&mut self) {
        self.token = None;
    }

    /// Drop session and token
    pub fn invalidate(&mut self) {
        if self.session.is_some() || self.token.is_some() {
            debug!("Invalidating session and token");
        }
        self.session = None;
        self.token = None;
    }
}

/// Check credentials with a one-shot session fetch
pub async fn verify_credentials(config: &ServiceConfig, credentials: Credentials) -> Result<Session, AuthError> {
    let mut manager = SessionManager::new(config, credentials)?;
    manager.get_session().await.cloned()
}

fn is_invalid_credentials(body: &[u8]) -> bool {
    serde_json::from_slice::<Vec<ErrorEntry>>(body)
        .ok()
        .and_then(|entries| entries.into_iter().next())
        .and_then(|entry| entry.code)
        .is_some_and(|code| code == "invalidCredentials")
}

fn status_text(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
