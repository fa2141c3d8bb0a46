//! In-memory account store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{AccountStore, ExternalIdentity, SessionRecord, SignupToken, StoreError, User};
use crate::auth::state::generate_token;

/// Lifetime of an unredeemed signup token
pub const SIGNUP_TTL: Duration = Duration::hours(1);

#[derive(Debug)]
struct PendingSignup {
    identity: ExternalIdentity,
    expires_at: DateTime<Utc>,
}

/// Process-local [`AccountStore`]
///
/// Every index is a `DashMap`, so single-key reads and inserts are atomic.
/// Name and identity uniqueness are enforced through map entries, which is
/// what lets concurrent `create_user` calls lose cleanly with
/// [`StoreError::UsernameTaken`] instead of producing duplicates.
///
/// Expired sessions are swept on every login and expired signup tokens on
/// every new signup token.
#[derive(Debug)]
pub struct MemoryAccountStore {
    users: DashMap<i64, User>,
    by_login: DashMap<ExternalIdentity, i64>,
    by_name: DashMap<String, i64>,
    sessions: DashMap<String, SessionRecord>,
    signups: DashMap<String, PendingSignup>,
    signup_ttl: Duration,
    next_id: AtomicI64,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            by_login: DashMap::new(),
            by_name: DashMap::new(),
            sessions: DashMap::new(),
            signups: DashMap::new(),
            signup_ttl: SIGNUP_TTL,
            next_id: AtomicI64::new(0),
        }
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long signup tokens stay redeemable
    pub fn with_signup_ttl(mut self, ttl: Duration) -> Self {
        self.signup_ttl = ttl;
        self
    }

    /// Number of live session bindings
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of outstanding signup tokens
    pub fn signup_count(&self) -> usize {
        self.signups.len()
    }

    fn user(&self, id: i64) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_by_login(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<Option<User>, StoreError> {
        let id = self.by_login.get(identity).map(|id| *id);
        Ok(id.and_then(|id| self.user(id)))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.user(id))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let id = self.by_name.get(&name.to_lowercase()).map(|id| *id);
        Ok(id.and_then(|id| self.user(id)))
    }

    async fn create_user(
        &self,
        name: &str,
        identity: ExternalIdentity,
        _ip: IpAddr,
    ) -> Result<User, StoreError> {
        let name_key = name.to_lowercase();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        match self.by_name.entry(name_key.clone()) {
            Entry::Occupied(_) => return Err(StoreError::UsernameTaken(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let user = User {
            id,
            name: name.to_string(),
            login: identity.clone(),
            created_at: Utc::now(),
        };
        self.users.insert(id, user.clone());

        match self.by_login.entry(identity.clone()) {
            Entry::Occupied(_) => {
                self.users.remove(&id);
                self.by_name.remove(&name_key);
                Err(StoreError::IdentityTaken(identity))
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(user)
            }
        }
    }

    async fn create_signup_token(
        &self,
        identity: ExternalIdentity,
    ) -> Result<SignupToken, StoreError> {
        let now = Utc::now();
        self.signups.retain(|_, pending| pending.expires_at > now);

        let token = generate_token();
        self.signups.insert(
            token.clone(),
            PendingSignup {
                identity,
                expires_at: now + self.signup_ttl,
            },
        );
        Ok(SignupToken::new(token))
    }

    async fn get_signup_token(&self, token: &str) -> Result<Option<ExternalIdentity>, StoreError> {
        let identity = match self.signups.get(token) {
            Some(pending) if pending.expires_at > Utc::now() => Some(pending.identity.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if identity.is_none() {
            self.signups.remove(token);
        }
        Ok(identity)
    }

    async fn delete_signup_token(&self, token: &str) -> Result<(), StoreError> {
        self.signups.remove(token);
        Ok(())
    }

    async fn log_in(&self, session: SessionRecord) -> Result<(), StoreError> {
        let now = Utc::now();
        self.sessions.retain(|_, record| record.expires_at > now);
        self.sessions
            .insert(session.token.as_str().to_string(), session);
        Ok(())
    }

    async fn log_out(&self, token: &str) -> Result<(), StoreError> {
        self.sessions.remove(token);
        Ok(())
    }

    async fn get_by_session(&self, token: &str) -> Result<Option<User>, StoreError> {
        let user_id = match self.sessions.get(token) {
            Some(record) if record.expires_at > Utc::now() => Some(record.user_id),
            Some(_) => None,
            None => return Ok(None),
        };

        match user_id {
            Some(id) => Ok(self.user(id)),
            None => {
                self.sessions.remove(token);
                Ok(None)
            }
        }
    }
}
