//! Trusted bridge sign-in
//!
//! A partner service that has already authenticated a user with the bridge
//! provider posts the identity here and receives a session for it, creating
//! the local account on first contact.

use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;

use super::constant_time_compare;
use super::session::SessionIssuer;
use crate::accounts::{AccountStore, ExternalIdentity, SessionToken, StoreError, User};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

const MISSING_FIELDS: &str =
    "Missing required fields: twitchId, twitchLogin, displayName, profileImageUrl";

/// Identity assertion posted by the partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeAssertion {
    pub external_id: String,
    pub external_login: String,
    pub display_name: String,
    pub profile_image_url: String,
}

impl BridgeAssertion {
    /// Parse the request body
    ///
    /// All four fields must be present and scalar; numbers and booleans are
    /// taken in their string form.
    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::BadRequest("Invalid data".into()))?;

        let field = |name: &str| -> Result<String> {
            match object.get(name) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                Some(Value::Bool(b)) => Ok(b.to_string()),
                _ => Err(Error::BadRequest(MISSING_FIELDS.into())),
            }
        };

        Ok(Self {
            external_id: field("twitchId")?,
            external_login: field("twitchLogin")?,
            display_name: field("displayName")?,
            profile_image_url: field("profileImageUrl")?,
        })
    }
}

/// Session handed back to the partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSession {
    pub token: SessionToken,
    pub user_id: i64,
    pub username: String,
}

/// Username derived from an external login
///
/// Lower-cased, reduced to `[a-z0-9_]`, and `user_<id>` when nothing is left.
pub fn candidate_username(login: &str, external_id: &str) -> String {
    let name: String = login
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    if name.is_empty() {
        format!("user_{}", external_id)
    } else {
        name
    }
}

/// Issues sessions for identities vouched for by the bridge partner
pub struct ExternalBridgeIssuer {
    store: Arc<dyn AccountStore>,
    sessions: Arc<SessionIssuer>,
    enabled: bool,
    provider_key: String,
    shared_secret: Option<String>,
}

impl ExternalBridgeIssuer {
    pub fn new(
        store: Arc<dyn AccountStore>,
        sessions: Arc<SessionIssuer>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            enabled: config.enabled,
            provider_key: config.provider_key.clone(),
            shared_secret: config.shared_secret.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether callers must present the shared secret
    pub fn requires_secret(&self) -> bool {
        self.shared_secret.is_some()
    }

    /// Check that the endpoint is on and the caller knows the secret, if one is set
    pub fn authorize(&self, presented: Option<&str>) -> Result<()> {
        if !self.enabled {
            return Err(Error::NotFound("bridge endpoint".into()));
        }
        match (&self.shared_secret, presented) {
            (None, _) => Ok(()),
            (Some(expected), Some(presented)) if constant_time_compare(expected, presented) => {
                Ok(())
            }
            (Some(_), _) => {
                tracing::warn!("Bridge request with missing or wrong token");
                Err(Error::Unauthorized("Invalid bridge token".into()))
            }
        }
    }

    /// Resolve or create the account behind `assertion` and log it in
    pub async fn issue(&self, assertion: &BridgeAssertion, ip: IpAddr) -> Result<BridgeSession> {
        let identity = ExternalIdentity::new(&self.provider_key, &assertion.external_id);

        let user = match self.store.get_by_login(&identity).await? {
            Some(user) => user,
            None => self.create_account(identity, &assertion.external_login, ip).await?,
        };

        let token = self.sessions.issue(&user, ip).await?;
        Ok(BridgeSession {
            token,
            user_id: user.id,
            username: user.name,
        })
    }

    async fn create_account(
        &self,
        identity: ExternalIdentity,
        login: &str,
        ip: IpAddr,
    ) -> Result<User> {
        let candidate = candidate_username(login, &identity.external_id);

        let mut username = candidate.clone();
        let mut suffix: u64 = 1;
        while self.store.get_by_name(&username).await?.is_some() {
            username = format!("{}{}", candidate, suffix);
            suffix += 1;
        }

        match self.store.create_user(&username, identity.clone(), ip).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.name, "Bridge account created");
                Ok(user)
            }
            Err(e @ (StoreError::UsernameTaken(_) | StoreError::IdentityTaken(_))) => {
                tracing::warn!(error = %e, "Bridge account creation lost a race, re-resolving");
                self.heal(&identity, &candidate, e).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find the account a concurrent request created in our place
    async fn heal(
        &self,
        identity: &ExternalIdentity,
        candidate: &str,
        cause: StoreError,
    ) -> Result<User> {
        if let Some(user) = self.store.get_by_login(identity).await? {
            return Ok(user);
        }
        if let Some(user) = self.store.get_by_name(candidate).await? {
            tracing::warn!(
                user_id = user.id,
                username = %user.name,
                "Bridge identity resolved by username"
            );
            return Ok(user);
        }
        Err(Error::Internal(format!(
            "Failed to create or find user: {}",
            cause
        )))
    }
}
