//! Provider registry

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::provider::AuthProvider;
use super::providers::build_providers;
use crate::config::{AuthConfig, ProvidersConfig};
use crate::error::{Error, Result};

/// Listing entry for one usable provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub id: String,
    pub registration_enabled: bool,
}

/// Providers keyed by provider id
///
/// The key set is fixed once startup registration is done; reloads only flip
/// each provider between usable and inert.
#[derive(Default)]
pub struct AuthServiceRegistry {
    services: HashMap<String, Arc<dyn AuthProvider>>,
}

impl AuthServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register every configured provider
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut registry = Self::new();
        for (key, provider) in build_providers(config) {
            registry.register(key, provider);
        }
        registry
    }

    /// Register a provider; returns false (and drops it) if it is not usable
    pub fn register(&mut self, key: impl Into<String>, provider: Arc<dyn AuthProvider>) -> bool {
        let key = key.into();
        if !provider.is_usable() {
            tracing::debug!(provider = %key, "Provider not usable, not registering");
            return false;
        }
        tracing::info!(provider = %key, "Registered auth provider");
        self.services.insert(key, provider);
        true
    }

    /// Usable provider for `key`
    pub fn lookup(&self, key: &str) -> Result<Arc<dyn AuthProvider>> {
        self.services
            .get(key)
            .filter(|provider| provider.is_usable())
            .cloned()
            .ok_or_else(|| Error::BadService(key.to_string()))
    }

    /// Registered provider for `key`, usable or not
    pub fn get(&self, key: &str) -> Option<Arc<dyn AuthProvider>> {
        self.services.get(key).cloned()
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.services.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Ask every registered provider to re-evaluate its switches
    pub fn reload_enabled_state(&self, providers: &ProvidersConfig) {
        for provider in self.services.values() {
            provider.reload_enabled_state(providers);
        }
    }

    /// Usable providers, sorted by key
    pub fn enabled_services(&self) -> Vec<ServiceInfo> {
        let mut services: Vec<ServiceInfo> = self
            .services
            .iter()
            .filter(|(_, provider)| provider.is_usable())
            .map(|(key, provider)| ServiceInfo {
                id: key.clone(),
                registration_enabled: provider.is_registration_enabled(),
            })
            .collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        services
    }
}

impl std::fmt::Debug for AuthServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServiceRegistry")
            .field("services", &self.keys())
            .finish()
    }
}
