//! Provider implementations and built-in endpoint presets

pub mod generic;

use std::sync::Arc;

pub use generic::OAuth2Provider;

use super::provider::AuthProvider;
use crate::config::AuthConfig;

/// Endpoints and quirks of a well-known OAuth2 service
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub authorization_endpoint: &'static str,
    pub token_endpoint: &'static str,
    pub userinfo_endpoint: &'static str,

    /// JSON pointer to the account id in the user info response
    pub identifier_field: &'static str,

    pub scopes: &'static [&'static str],

    /// Extra query parameters for the authorization URL
    pub extra_params: &'static [(&'static str, &'static str)],

    /// Send `Client-Id` alongside the bearer token on user info requests
    pub client_id_header: bool,

    /// Send client credentials in the token request body instead of Basic auth
    pub credentials_in_body: bool,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "google",
        authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth",
        token_endpoint: "https://oauth2.googleapis.com/token",
        userinfo_endpoint: "https://openidconnect.googleapis.com/v1/userinfo",
        identifier_field: "/sub",
        scopes: &["openid"],
        extra_params: &[],
        client_id_header: false,
        credentials_in_body: false,
    },
    Preset {
        name: "discord",
        authorization_endpoint: "https://discord.com/oauth2/authorize",
        token_endpoint: "https://discord.com/api/oauth2/token",
        userinfo_endpoint: "https://discord.com/api/users/@me",
        identifier_field: "/id",
        scopes: &["identify"],
        extra_params: &[],
        client_id_header: false,
        credentials_in_body: false,
    },
    Preset {
        name: "reddit",
        authorization_endpoint: "https://www.reddit.com/api/v1/authorize",
        token_endpoint: "https://www.reddit.com/api/v1/access_token",
        userinfo_endpoint: "https://oauth.reddit.com/api/v1/me",
        identifier_field: "/name",
        scopes: &["identity"],
        extra_params: &[("duration", "temporary")],
        client_id_header: false,
        credentials_in_body: false,
    },
    Preset {
        name: "twitch",
        authorization_endpoint: "https://id.twitch.tv/oauth2/authorize",
        token_endpoint: "https://id.twitch.tv/oauth2/token",
        userinfo_endpoint: "https://api.twitch.tv/helix/users",
        identifier_field: "/data/0/id",
        scopes: &[],
        extra_params: &[],
        client_id_header: true,
        credentials_in_body: true,
    },
    Preset {
        name: "github",
        authorization_endpoint: "https://github.com/login/oauth/authorize",
        token_endpoint: "https://github.com/login/oauth/access_token",
        userinfo_endpoint: "https://api.github.com/user",
        identifier_field: "/id",
        scopes: &["read:user"],
        extra_params: &[],
        client_id_header: false,
        credentials_in_body: false,
    },
];

/// Look up a built-in preset by name
pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Build a provider for every configured section
///
/// Sections that cannot produce a client are skipped: with a warning when
/// they were meant to be usable, silently otherwise.
pub fn build_providers(config: &AuthConfig) -> Vec<(String, Arc<dyn AuthProvider>)> {
    let mut providers: Vec<(String, Arc<dyn AuthProvider>)> = Vec::new();

    for (key, section) in &config.providers {
        match OAuth2Provider::new(key, section, config.state_ttl()) {
            Ok(provider) => providers.push((key.clone(), Arc::new(provider))),
            Err(e) if section.is_usable() => {
                tracing::warn!(provider = %key, error = %e, "Skipping provider");
            }
            Err(e) => {
                tracing::debug!(provider = %key, error = %e, "Provider section not configured");
            }
        }
    }

    providers
}
