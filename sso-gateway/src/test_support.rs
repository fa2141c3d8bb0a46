//! Shared fixtures for unit and router tests

use async_trait::async_trait;
use axum::{body::Body, http::Response};
use oauth2::url::form_urlencoded;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::auth::provider::{AuthProvider, ProviderError, ProviderSwitches};
use crate::auth::state::StateStore;
use crate::config::{ProviderConfig, ProvidersConfig};
use crate::extract::RequestOrigin;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub fn origin(secure: bool) -> RequestOrigin {
    RequestOrigin {
        ip: LOCALHOST,
        secure,
    }
}

enum TokenReply {
    Token(Option<String>),
    Failure,
}

enum IdentifierReply {
    Identifier(String),
    InvalidAccount(String),
}

/// In-process provider with scripted token and identifier answers
pub struct FakeProvider {
    key: String,
    states: StateStore,
    switches: ProviderSwitches,
    token: TokenReply,
    identifier: IdentifierReply,
    network_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(key: &str) -> Self {
        Self::with_section(key, &usable_section())
    }

    /// Registered without credentials
    pub fn inert(key: &str) -> Self {
        Self::with_section(key, &ProviderConfig::default())
    }

    fn with_section(key: &str, section: &ProviderConfig) -> Self {
        Self {
            key: key.to_string(),
            states: StateStore::new(Duration::from_secs(600)),
            switches: ProviderSwitches::new(section),
            token: TokenReply::Token(Some("access-token".into())),
            identifier: IdentifierReply::Identifier("ext-1".into()),
            network_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier = IdentifierReply::Identifier(identifier.to_string());
        self
    }

    pub fn with_invalid_account(mut self, message: &str) -> Self {
        self.identifier = IdentifierReply::InvalidAccount(message.to_string());
        self
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = TokenReply::Token(token.map(str::to_string));
        self
    }

    pub fn with_exchange_failure(mut self) -> Self {
        self.token = TokenReply::Failure;
        self
    }

    pub fn with_registration(self, enabled: bool) -> Self {
        let section = ProviderConfig {
            registration_enabled: enabled,
            ..usable_section()
        };
        Self {
            switches: ProviderSwitches::new(&section),
            ..self
        }
    }

    /// Token and identifier requests served so far
    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }
}

pub fn usable_section() -> ProviderConfig {
    ProviderConfig {
        client_id: "id".into(),
        client_secret: "secret".into(),
        ..ProviderConfig::default()
    }
}

#[async_trait]
impl AuthProvider for FakeProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn generate_state(&self) -> String {
        self.states.issue()
    }

    fn verify_state(&self, raw: &str) -> bool {
        self.states.verify(raw)
    }

    fn redirect_url(&self, state: &str) -> String {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("state", state)
            .finish();
        format!("https://{}.example/authorize?{}", self.key, query)
    }

    async fn get_token(&self, _code: &str) -> Result<Option<String>, ProviderError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        match &self.token {
            TokenReply::Token(token) => Ok(token.clone()),
            TokenReply::Failure => Err(ProviderError::Exchange("connection reset".into())),
        }
    }

    async fn get_identifier(&self, _token: &str) -> Result<String, ProviderError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        match &self.identifier {
            IdentifierReply::Identifier(id) => Ok(id.clone()),
            IdentifierReply::InvalidAccount(message) => {
                Err(ProviderError::InvalidAccount(message.clone()))
            }
        }
    }

    fn is_registration_enabled(&self) -> bool {
        self.switches.is_registration_enabled()
    }

    fn is_usable(&self) -> bool {
        self.switches.is_usable()
    }

    fn reload_enabled_state(&self, providers: &ProvidersConfig) {
        self.switches.reload(&self.key, providers);
    }
}

/// Collect a response body as JSON
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values of a response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}
