//! Account collaborator contract
//!
//! The gateway never owns account persistence. It reaches accounts, external
//! logins, signup tokens and session bindings through [`AccountStore`].
//! [`MemoryAccountStore`] is the in-process implementation used by the
//! binary in development and by the tests.
//!
//! Implementations must make each single-key get/create linearizable. They are
//! *not* required to make "check the name is free, then create" atomic;
//! [`create_user`](AccountStore::create_user) reports a lost race as
//! [`StoreError::UsernameTaken`] and callers heal from it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryAccountStore;

/// A (provider, external id) pair; bound to at most one local account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Provider key, e.g. "discord"
    pub provider: String,

    /// Account id as reported by the provider
    pub external_id: String,
}

impl ExternalIdentity {
    pub fn new(provider: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.external_id)
    }
}

/// Local account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub login: ExternalIdentity,
    pub created_at: DateTime<Utc>,
}

/// Opaque session credential handed to the browser
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use credential standing in for a verified, not yet bound identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignupToken(String);

impl SignupToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side binding of a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: SessionToken,
    pub user_id: i64,
    pub ip: IpAddr,
    pub expires_at: DateTime<Utc>,
}

/// Account store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another account already holds the name
    #[error("username {0} is taken")]
    UsernameTaken(String),

    /// The external identity is already bound to an account
    #[error("identity {0} is already bound")]
    IdentityTaken(ExternalIdentity),

    /// Backend failure
    #[error("{0}")]
    Backend(String),
}

/// Capability interface onto account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Account bound to an external identity
    async fn get_by_login(&self, identity: &ExternalIdentity) -> Result<Option<User>, StoreError>;

    /// Account by id
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Account by name (case-insensitive)
    async fn get_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;

    /// Create an account bound to `identity`
    async fn create_user(
        &self,
        name: &str,
        identity: ExternalIdentity,
        ip: IpAddr,
    ) -> Result<User, StoreError>;

    /// Mint a signup token wrapping an unbound identity
    async fn create_signup_token(
        &self,
        identity: ExternalIdentity,
    ) -> Result<SignupToken, StoreError>;

    /// Identity wrapped by a live signup token
    async fn get_signup_token(&self, token: &str) -> Result<Option<ExternalIdentity>, StoreError>;

    /// Retire a signup token once it has been redeemed
    async fn delete_signup_token(&self, token: &str) -> Result<(), StoreError>;

    /// Persist a session binding
    async fn log_in(&self, session: SessionRecord) -> Result<(), StoreError>;

    /// Delete a session binding; unknown tokens are ignored
    async fn log_out(&self, token: &str) -> Result<(), StoreError>;

    /// Account bound to a live (unexpired, unrevoked) session token
    async fn get_by_session(&self, token: &str) -> Result<Option<User>, StoreError>;
}
