use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sso_gateway::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // SSO_CONFIG pins one file; otherwise the usual search path applies
    let config_path = std::env::var_os("SSO_CONFIG").map(PathBuf::from);
    let config = match &config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config)?;

    let store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let mut builder = AppState::builder().config(config.clone()).store(store);
    if let Some(path) = config_path {
        builder = builder.config_path(path);
    }
    let state = builder.build().context("failed to build application state")?;

    let services = state.registry().enabled_services();
    tracing::info!(
        providers = ?services.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        registration_enabled = state.resolver().is_registration_enabled(),
        "Auth services ready"
    );
    if services.is_empty() {
        tracing::warn!("No usable auth provider configured; sign-in will fail");
    }

    if state.bridge().is_enabled() && !state.bridge().requires_secret() {
        tracing::warn!(
            "Bridge endpoint has no shared secret; it trusts every caller that can reach it"
        );
    }
    if config.management.token.is_none() {
        tracing::info!("Management endpoint disabled (no token configured)");
    }

    Server::new(config).serve(router(state)).await?;

    Ok(())
}
