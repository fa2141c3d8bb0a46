//! # sso-gateway
//!
//! Pluggable third-party sign-in for a web application: OAuth providers
//! selected by key, cookie-backed sessions, and a bridge entry point for
//! identities a trusted partner has already verified.
//!
//! ## Features
//!
//! - **Provider registry**: Google, Discord, Reddit, Twitch and GitHub presets, or any OAuth2 endpoint set
//! - **Two completion modes**: 302 to a completion page, or inline JSON
//! - **Single-use state**: every issued state expires and verifies once
//! - **Signup tokens**: unknown identities finish registration through `POST /signup`
//! - **Hot reload**: provider and registration switches flip without a restart
//! - **Graceful shutdown**: Proper signal handling (SIGTERM, SIGINT)
//!
//! ## Example
//!
//! ```rust,no_run
//! use sso_gateway::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Build application state
//!     let state = AppState::builder().config(config.clone()).build()?;
//!
//!     // Run server
//!     Server::new(config).serve(router(state)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::accounts::{AccountStore, ExternalIdentity, MemoryAccountStore, User};
    pub use crate::auth::{
        AuthProvider, AuthServiceRegistry, ExternalBridgeIssuer, IdentityResolver,
        OAuthFlowController, SessionIssuer,
    };
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::extract::RequestOrigin;
    pub use crate::health::health;
    pub use crate::middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
        SENSITIVE_HEADERS,
    };
    pub use crate::observability::init_tracing;
    pub use crate::routes::router;
    pub use crate::server::Server;
    pub use crate::state::{AppState, AppStateBuilder};
}
