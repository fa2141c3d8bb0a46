//! Application state shared across handlers

use std::path::PathBuf;
use std::sync::Arc;

use crate::accounts::{AccountStore, MemoryAccountStore};
use crate::auth::{
    registry::ServiceInfo, AuthServiceRegistry, ExternalBridgeIssuer, IdentityResolver,
    OAuthFlowController, SessionIssuer,
};
use crate::config::Config;
use crate::error::Result;

/// Application state shared across handlers
///
/// Cheap to clone; everything lives behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    config_path: Option<PathBuf>,
    registry: Arc<AuthServiceRegistry>,
    resolver: Arc<IdentityResolver>,
    sessions: Arc<SessionIssuer>,
    flow: OAuthFlowController,
    bridge: ExternalBridgeIssuer,
}

impl AppState {
    /// Create a new builder for AppState
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Get the configuration loaded at startup
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &AuthServiceRegistry {
        &self.inner.registry
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.inner.resolver
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.inner.sessions
    }

    pub fn flow(&self) -> &OAuthFlowController {
        &self.inner.flow
    }

    pub fn bridge(&self) -> &ExternalBridgeIssuer {
        &self.inner.bridge
    }

    /// Re-read configuration and apply the provider and registration switches
    ///
    /// Only switches change; provider keys, endpoints and server settings keep
    /// their startup values.
    pub fn reload(&self) -> Result<Vec<ServiceInfo>> {
        let fresh = match &self.inner.config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        self.inner
            .registry
            .reload_enabled_state(&fresh.auth.providers);
        self.inner
            .resolver
            .set_registration_enabled(fresh.auth.registration_enabled);

        let services = self.inner.registry.enabled_services();
        tracing::info!(
            usable = services.len(),
            registered = self.inner.registry.keys().len(),
            registration_enabled = fresh.auth.registration_enabled,
            "Configuration reloaded"
        );
        Ok(services)
    }
}

/// Builder for AppState
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    config_path: Option<PathBuf>,
    store: Option<Arc<dyn AccountStore>>,
    registry: Option<AuthServiceRegistry>,
}

impl AppStateBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// File that reloads read from instead of the default search path
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Set the account store (defaults to an in-memory store)
    pub fn store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a pre-built registry instead of building one from configuration
    pub fn registry(mut self, registry: AuthServiceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the AppState
    pub fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryAccountStore::new()));
        let registry = Arc::new(
            self.registry
                .unwrap_or_else(|| AuthServiceRegistry::from_config(&config.auth)),
        );

        let resolver = Arc::new(IdentityResolver::new(
            store.clone(),
            config.auth.registration_enabled,
        ));
        let sessions = Arc::new(SessionIssuer::new(store.clone(), &config.auth));
        let flow = OAuthFlowController::new(
            &config.auth,
            registry.clone(),
            resolver.clone(),
            sessions.clone(),
        )?;
        let bridge = ExternalBridgeIssuer::new(store, sessions.clone(), &config.bridge);

        Ok(AppState {
            inner: Arc::new(Inner {
                config,
                config_path: self.config_path,
                registry,
                resolver,
                sessions,
                flow,
                bridge,
            }),
        })
    }
}
