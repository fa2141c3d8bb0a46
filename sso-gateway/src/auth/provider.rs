//! Provider trait and shared provider plumbing

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::config::{ProviderConfig, ProvidersConfig};

/// Failures reported by a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered but refuses to vouch for this account
    #[error("{0}")]
    InvalidAccount(String),

    /// Transport or protocol failure talking to the provider
    #[error("provider request failed: {0}")]
    Exchange(String),

    /// The provider section cannot produce a working client
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

/// One pluggable identity provider
///
/// A provider owns its state tokens: [`generate_state`](Self::generate_state)
/// issues one and [`verify_state`](Self::verify_state) consumes it.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Provider key, e.g. "discord"
    fn key(&self) -> &str;

    /// Issue a fresh state value
    fn generate_state(&self) -> String;

    /// Consume a state value previously issued by this provider
    fn verify_state(&self, raw: &str) -> bool;

    /// Authorization URL carrying the wire-encoded state
    fn redirect_url(&self, state: &str) -> String;

    /// Exchange an authorization code for an access token
    ///
    /// `Ok(None)` means the provider rejected the code.
    async fn get_token(&self, code: &str) -> Result<Option<String>, ProviderError>;

    /// Stable account identifier behind an access token
    async fn get_identifier(&self, token: &str) -> Result<String, ProviderError>;

    /// Whether unknown identities from this provider may sign up
    fn is_registration_enabled(&self) -> bool;

    /// Whether the provider is configured and switched on
    fn is_usable(&self) -> bool;

    /// Re-read the usability and registration switches from live configuration
    fn reload_enabled_state(&self, providers: &ProvidersConfig);
}

/// Runtime switches shared by provider implementations
///
/// Each flag flips atomically and independently so a reload never blocks
/// in-flight sign-ins.
#[derive(Debug)]
pub struct ProviderSwitches {
    usable: AtomicBool,
    registration: AtomicBool,
}

impl ProviderSwitches {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            usable: AtomicBool::new(config.is_usable()),
            registration: AtomicBool::new(config.registration_enabled),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.usable.load(Ordering::Acquire)
    }

    pub fn is_registration_enabled(&self) -> bool {
        self.registration.load(Ordering::Acquire)
    }

    /// Apply the section for `key`; a missing section leaves the provider inert
    pub fn reload(&self, key: &str, providers: &ProvidersConfig) {
        let (usable, registration) = match providers.get(key) {
            Some(section) => (section.is_usable(), section.registration_enabled),
            None => (false, false),
        };
        let was_usable = self.usable.swap(usable, Ordering::AcqRel);
        self.registration.store(registration, Ordering::Release);

        if was_usable != usable {
            tracing::info!(provider = key, usable, "Provider usability changed");
        }
    }
}
