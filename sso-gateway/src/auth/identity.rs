//! External identity to local account resolution

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::provider::AuthProvider;
use crate::accounts::{AccountStore, ExternalIdentity, SignupToken, StoreError, User};
use crate::error::{Error, Result};

/// Outcome of resolving a verified identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The identity is bound to this account
    Existing(User),

    /// No account yet; the client finishes signup with this token
    Signup(SignupToken),
}

/// Maps verified (provider, external id) pairs onto local accounts
pub struct IdentityResolver {
    store: Arc<dyn AccountStore>,
    registration_enabled: AtomicBool,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn AccountStore>, registration_enabled: bool) -> Self {
        Self {
            store,
            registration_enabled: AtomicBool::new(registration_enabled),
        }
    }

    /// Global registration switch
    pub fn is_registration_enabled(&self) -> bool {
        self.registration_enabled.load(Ordering::Acquire)
    }

    pub fn set_registration_enabled(&self, enabled: bool) {
        self.registration_enabled.store(enabled, Ordering::Release);
    }

    /// Find the account bound to `identifier`, or mint a signup token for it
    ///
    /// Unknown identities need both the provider's and the global
    /// registration switch on; otherwise the attempt fails with
    /// [`Error::InvalidServiceOperation`].
    pub async fn resolve_or_prepare_signup(
        &self,
        provider: &dyn AuthProvider,
        identifier: &str,
    ) -> Result<Resolution> {
        let identity = ExternalIdentity::new(provider.key(), identifier);

        if let Some(user) = self.store.get_by_login(&identity).await? {
            return Ok(Resolution::Existing(user));
        }

        if !(provider.is_registration_enabled() && self.is_registration_enabled()) {
            tracing::info!(
                provider = provider.key(),
                "Unknown identity while registration is disabled"
            );
            return Err(Error::InvalidServiceOperation);
        }

        let token = self.store.create_signup_token(identity).await?;
        Ok(Resolution::Signup(token))
    }

    /// Redeem a signup token by creating the account it stands for
    ///
    /// A taken username leaves the token valid so the client can retry with
    /// another name.
    pub async fn complete_signup(&self, token: &str, username: &str, ip: IpAddr) -> Result<User> {
        if !self.is_registration_enabled() {
            return Err(Error::RegistrationDisabled);
        }
        if token.is_empty() {
            return Err(Error::BadSignupToken("Missing signup token".into()));
        }
        validate_username(username)?;

        let identity = self
            .store
            .get_signup_token(token)
            .await?
            .ok_or_else(|| Error::BadSignupToken("Invalid signup token".into()))?;

        match self.store.create_user(username, identity, ip).await {
            Ok(user) => {
                self.store.delete_signup_token(token).await?;
                tracing::info!(user_id = user.id, login = %user.login, "Account created");
                Ok(user)
            }
            Err(StoreError::UsernameTaken(_)) => {
                Err(Error::BadUsername("Username taken, try another?".into()))
            }
            Err(StoreError::IdentityTaken(_)) => {
                self.store.delete_signup_token(token).await?;
                Err(Error::BadSignupToken("Invalid signup token".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::BadUsername("Username may not be empty".into()));
    }
    let valid = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(Error::BadUsername(
            "Username contains invalid characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryAccountStore;
    use crate::test_support::{FakeProvider, LOCALHOST};

    fn setup(registration: bool) -> (Arc<MemoryAccountStore>, IdentityResolver) {
        let store = Arc::new(MemoryAccountStore::new());
        let resolver = IdentityResolver::new(store.clone(), registration);
        (store, resolver)
    }

    #[tokio::test]
    async fn test_known_identity_resolves_to_user() {
        let (store, resolver) = setup(true);
        let user = store
            .create_user("dana", ExternalIdentity::new("discord", "7"), LOCALHOST)
            .await
            .unwrap();

        let resolution = resolver
            .resolve_or_prepare_signup(&FakeProvider::new("discord"), "7")
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Existing(user));
    }

    #[tokio::test]
    async fn test_unknown_identity_gets_signup_token() {
        let (store, resolver) = setup(true);
        let resolution = resolver
            .resolve_or_prepare_signup(&FakeProvider::new("discord"), "8")
            .await
            .unwrap();

        let Resolution::Signup(token) = resolution else {
            panic!("expected signup");
        };
        assert_eq!(
            store.get_signup_token(token.as_str()).await.unwrap(),
            Some(ExternalIdentity::new("discord", "8"))
        );
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_identity_with_registration_disabled() {
        let (_, resolver) = setup(true);
        let provider = FakeProvider::new("discord").with_registration(false);
        let err = resolver
            .resolve_or_prepare_signup(&provider, "9")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidServiceOperation));

        let (_, resolver) = setup(false);
        let err = resolver
            .resolve_or_prepare_signup(&FakeProvider::new("discord"), "9")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidServiceOperation));
    }

    #[tokio::test]
    async fn test_complete_signup() {
        let (store, resolver) = setup(true);
        let token = store
            .create_signup_token(ExternalIdentity::new("google", "g-1"))
            .await
            .unwrap();

        let user = resolver
            .complete_signup(token.as_str(), "erin", LOCALHOST)
            .await
            .unwrap();
        assert_eq!(user.name, "erin");
        assert_eq!(user.login, ExternalIdentity::new("google", "g-1"));

        // redeemed tokens are gone
        let err = resolver
            .complete_signup(token.as_str(), "erin2", LOCALHOST)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadSignupToken(_)));
    }

    #[tokio::test]
    async fn test_signup_with_taken_name_keeps_token() {
        let (store, resolver) = setup(true);
        store
            .create_user("frank", ExternalIdentity::new("twitch", "1"), LOCALHOST)
            .await
            .unwrap();
        let token = store
            .create_signup_token(ExternalIdentity::new("twitch", "2"))
            .await
            .unwrap();

        let err = resolver
            .complete_signup(token.as_str(), "Frank", LOCALHOST)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "bad_username");

        let user = resolver
            .complete_signup(token.as_str(), "frankie", LOCALHOST)
            .await
            .unwrap();
        assert_eq!(user.name, "frankie");
    }

    #[tokio::test]
    async fn test_signup_rejections() {
        let (_, resolver) = setup(true);
        let err = resolver.complete_signup("", "x", LOCALHOST).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing signup token");

        let err = resolver.complete_signup("t", "", LOCALHOST).await.unwrap_err();
        assert_eq!(err.to_string(), "Username may not be empty");

        let err = resolver
            .complete_signup("t", "bad name!", LOCALHOST)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Username contains invalid characters");

        let err = resolver
            .complete_signup("unknown", "fine_name", LOCALHOST)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid signup token");

        let (_, resolver) = setup(false);
        let err = resolver.complete_signup("t", "x", LOCALHOST).await.unwrap_err();
        assert!(matches!(err, Error::RegistrationDisabled));
    }
}
