//! Configurable OAuth2 authorization-code provider

use async_trait::async_trait;
use oauth2::{
    basic::{BasicErrorResponse, BasicTokenType},
    AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken,
    EmptyExtraTokenFields, RedirectUrl, RequestTokenError, Scope, StandardRevocableToken,
    StandardTokenIntrospectionResponse, StandardTokenResponse, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

use super::preset;
use crate::auth::provider::{AuthProvider, ProviderError, ProviderSwitches};
use crate::auth::state::StateStore;
use crate::config::{ProviderConfig, ProvidersConfig};

/// Type alias for our configured OAuth client
type ConfiguredClient = Client<
    BasicErrorResponse,
    StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardRevocableToken,
    BasicErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

/// OAuth2 provider driven entirely by its configuration section
///
/// Endpoints come from the section's overrides, falling back to the built-in
/// preset named by `preset` (or by the section key).
pub struct OAuth2Provider {
    key: String,
    client: ConfiguredClient,
    http_client: HttpClient,
    client_id: String,
    scopes: Vec<String>,
    extra_params: Vec<(String, String)>,
    userinfo_endpoint: String,
    identifier_field: String,
    client_id_header: bool,
    states: StateStore,
    switches: ProviderSwitches,
}

impl OAuth2Provider {
    /// Create a provider from its configuration section
    pub fn new(
        key: &str,
        config: &ProviderConfig,
        state_ttl: Duration,
    ) -> Result<Self, ProviderError> {
        let preset = preset(config.preset.as_deref().unwrap_or(key));

        let auth_url = resolve(
            &config.authorization_endpoint,
            preset.map(|p| p.authorization_endpoint),
            "authorization endpoint",
        )?;
        let token_url = resolve(
            &config.token_endpoint,
            preset.map(|p| p.token_endpoint),
            "token endpoint",
        )?;
        let userinfo_endpoint = resolve(
            &config.userinfo_endpoint,
            preset.map(|p| p.userinfo_endpoint),
            "user info endpoint",
        )?;
        let identifier_field = resolve(
            &config.identifier_field,
            preset.map(|p| p.identifier_field),
            "identifier field",
        )?;

        let mut client = Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(auth_url)
                    .map_err(|e| ProviderError::Config(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(token_url)
                    .map_err(|e| ProviderError::Config(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone())
                    .map_err(|e| ProviderError::Config(format!("Invalid redirect URI: {}", e)))?,
            );

        if preset.is_some_and(|p| p.credentials_in_body) {
            client = client.set_auth_type(AuthType::RequestBody);
        }

        let http_client = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("sso-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let scopes = if config.scopes.is_empty() {
            preset
                .map(|p| p.scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        } else {
            config.scopes.clone()
        };

        let extra_params = preset
            .map(|p| {
                p.extra_params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            key: key.to_string(),
            client,
            http_client,
            client_id: config.client_id.clone(),
            scopes,
            extra_params,
            userinfo_endpoint,
            identifier_field,
            client_id_header: preset.is_some_and(|p| p.client_id_header),
            states: StateStore::new(state_ttl),
            switches: ProviderSwitches::new(config),
        })
    }
}

fn resolve(
    configured: &Option<String>,
    preset: Option<&'static str>,
    what: &str,
) -> Result<String, ProviderError> {
    configured
        .clone()
        .or_else(|| preset.map(str::to_string))
        .ok_or_else(|| ProviderError::Config(format!("no {} and no matching preset", what)))
}

/// Read the account id at `pointer`; numbers are rendered as decimal strings
fn extract_identifier(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl AuthProvider for OAuth2Provider {
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
        let mut auth_request = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_string()));

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }
        for (name, value) in &self.extra_params {
            auth_request = auth_request.add_extra_param(name.as_str(), value.as_str());
        }

        let (url, _) = auth_request.url();
        url.to_string()
    }

    async fn get_token(&self, code: &str) -> Result<Option<String>, ProviderError> {
        let result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await;

        match result {
            Ok(token) => Ok(Some(token.access_token().secret().clone())),
            Err(RequestTokenError::ServerResponse(e)) => {
                tracing::debug!(provider = %self.key, error = %e, "Authorization code rejected");
                Ok(None)
            }
            Err(e) => Err(ProviderError::Exchange(format!(
                "{} token exchange failed: {}",
                self.key, e
            ))),
        }
    }

    async fn get_identifier(&self, token: &str) -> Result<String, ProviderError> {
        let mut request = self
            .http_client
            .get(&self.userinfo_endpoint)
            .bearer_auth(token);
        if self.client_id_header {
            request = request.header("Client-Id", &self.client_id);
        }

        let response = request.send().await.map_err(|e| {
            ProviderError::Exchange(format!("Failed to fetch {} user info: {}", self.key, e))
        })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ProviderError::InvalidAccount(format!(
                "{} refused the account lookup ({})",
                self.key, status
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Exchange(format!(
                "{} user info request failed: {}",
                self.key, status
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::Exchange(format!("Failed to parse {} user info: {}", self.key, e))
        })?;

        extract_identifier(&body, &self.identifier_field).ok_or_else(|| {
            ProviderError::InvalidAccount(format!("{} did not report an account id", self.key))
        })
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
