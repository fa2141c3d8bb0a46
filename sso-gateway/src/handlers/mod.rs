//! HTTP handlers
//!
//! Thin adapters between axum extractors and the auth components held in
//! [`AppState`](crate::state::AppState).

pub mod bridge;
pub mod manage;
pub mod oauth;
pub mod session;

pub use bridge::bridge;
pub use manage::manage;
pub use oauth::{auth, services, sign_in, signup};
pub use session::{logout, whoami};
