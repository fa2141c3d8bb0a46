//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `SSO_`, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/sso-gateway/config.toml
//! 4. System directory: /etc/sso-gateway/config.toml
//! 5. Default values
//!
//! # Example
//!
//! ```toml
//! [auth]
//! host = "example.com"
//! https = true
//! frontend_port = 443
//!
//! [auth.providers.discord]
//! client_id = "1234"
//! client_secret = "secret"
//! redirect_uri = "https://example.com/auth/discord"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

const APP_DIR: &str = "sso-gateway";
const ENV_PREFIX: &str = "SSO_";

/// Provider sections keyed by provider id
pub type ProvidersConfig = BTreeMap<String, ProviderConfig>;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP server behaviour
    #[serde(default)]
    pub server: ServerConfig,

    /// Sign-in and session configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Trusted bridge endpoint
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Operator endpoints
    #[serde(default)]
    pub management: ManagementConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            timeout_secs: default_timeout(),
            environment: default_environment(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Trust `X-Forwarded-For` / `X-Forwarded-Proto` from a reverse proxy
    #[serde(default)]
    pub trust_forwarded_headers: bool,

    /// Request body size limit in KiB
    #[serde(default = "default_body_limit_kb")]
    pub body_limit_kb: usize,

    /// CORS mode: permissive, restrictive or disabled
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_headers: false,
            body_limit_kb: default_body_limit_kb(),
            cors_mode: default_cors_mode(),
        }
    }
}

/// Sign-in and session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Public host name; session cookies are scoped to it and to `.{host}`
    #[serde(default = "default_host")]
    pub host: String,

    /// Whether the public site is served over HTTPS
    #[serde(default)]
    pub https: bool,

    /// Port the front end (and its completion page) is served on
    #[serde(default = "default_frontend_port")]
    pub frontend_port: u16,

    /// Path of the static completion page the redirect mode lands on
    #[serde(default = "default_completion_path")]
    pub completion_path: String,

    /// Session cookie lifetime in days
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,

    /// Session cookie name
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Pending-redirect marker cookie name
    #[serde(default = "default_redirect_cookie")]
    pub redirect_cookie: String,

    /// Pending-redirect marker lifetime in seconds
    #[serde(default = "default_redirect_cookie_ttl_secs")]
    pub redirect_cookie_ttl_secs: u64,

    /// Lifetime of an issued state token in seconds
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// Global switch for bootstrapping new accounts from external logins
    #[serde(default = "default_true")]
    pub registration_enabled: bool,

    /// Provider sections keyed by provider id
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            https: false,
            frontend_port: default_frontend_port(),
            completion_path: default_completion_path(),
            session_ttl_days: default_session_ttl_days(),
            session_cookie: default_session_cookie(),
            redirect_cookie: default_redirect_cookie(),
            redirect_cookie_ttl_secs: default_redirect_cookie_ttl_secs(),
            state_ttl_secs: default_state_ttl_secs(),
            registration_enabled: true,
            providers: ProvidersConfig::new(),
        }
    }
}

impl AuthConfig {
    /// Base URL of the completion page, without query
    pub fn completion_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!(
            "{}://{}:{}{}",
            scheme, self.host, self.frontend_port, self.completion_path
        )
    }

    /// State token lifetime as Duration
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

/// One provider section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Operator switch; a disabled provider stays registered but inert
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether unknown identities from this provider may sign up
    #[serde(default = "default_true")]
    pub registration_enabled: bool,

    /// Built-in endpoint preset (google, discord, reddit, twitch, github);
    /// defaults to the section key
    #[serde(default)]
    pub preset: Option<String>,

    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Callback URL registered with the provider
    #[serde(default)]
    pub redirect_uri: String,

    /// Scopes to request; empty uses the preset's scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Authorization endpoint override
    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint override
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// User info endpoint override
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,

    /// JSON pointer to the account identifier in the user info response
    #[serde(default)]
    pub identifier_field: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            registration_enabled: true,
            preset: None,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: Vec::new(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            identifier_field: None,
        }
    }
}

impl ProviderConfig {
    /// Whether this section is switched on and carries credentials
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Bridge endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Expose `POST /auth/bridge`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider key the bridged identities are recorded under
    #[serde(default = "default_bridge_provider")]
    pub provider_key: String,

    /// Shared secret expected in `X-Bridge-Token`; unset trusts the network
    #[serde(default)]
    pub shared_secret: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider_key: default_bridge_provider(),
            shared_secret: None,
        }
    }
}

/// Operator endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Token expected in `X-Manage-Token`; unset disables `/manage/*`
    #[serde(default)]
    pub token: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    APP_DIR.to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_body_limit_kb() -> usize {
    64
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_frontend_port() -> u16 {
    80
}

fn default_completion_path() -> String {
    "/auth_done.html".to_string()
}

fn default_session_ttl_days() -> i64 {
    24
}

fn default_session_cookie() -> String {
    "sso-token".to_string()
}

fn default_redirect_cookie() -> String {
    "sso-auth-redirect".to_string()
}

fn default_redirect_cookie_ttl_secs() -> u64 {
    600
}

fn default_state_ttl_secs() -> u64 {
    600
}

fn default_bridge_provider() -> String {
    "twitch".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found wins per key):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/sso-gateway/config.toml
    /// 3. System directory: /etc/sso-gateway/config.toml
    ///
    /// Environment variables (`SSO_` prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the search path; environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR);
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(Path::new("/etc").join(APP_DIR).join("config.toml"));
        paths
    }
}
