//! Session issuance and the session cookie pair
//!
//! A session is delivered as two cookies with the same value, one scoped to
//! `.{host}` and one to `{host}`, preceded by an expired host-only cookie that
//! clears any stale value set without a domain.

use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;
use http::{header::SET_COOKIE, HeaderValue};
use std::convert::Infallible;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;

use super::state::generate_token;
use crate::accounts::{AccountStore, SessionRecord, SessionToken, User};
use crate::config::AuthConfig;
use crate::error::Result;

/// A cookie plus a verbatim `Domain` attribute
///
/// The cookie crate normalises a leading dot out of `Domain`; the session pair
/// needs it kept, so the attribute is rendered here instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedCookie {
    cookie: Cookie<'static>,
    domain: Option<String>,
}

impl ScopedCookie {
    pub fn new(cookie: Cookie<'static>) -> Self {
        Self {
            cookie,
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn cookie(&self) -> &Cookie<'static> {
        &self.cookie
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl fmt::Display for ScopedCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cookie)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        Ok(())
    }
}

/// Ordered `Set-Cookie` headers
///
/// Unlike `CookieJar`, several cookies with the same name are all emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetCookies(Vec<ScopedCookie>);

impl SetCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cookie: ScopedCookie) {
        self.0.push(cookie);
    }

    pub fn append(&mut self, other: SetCookies) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScopedCookie> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoResponseParts for SetCookies {
    type Error = Infallible;

    fn into_response_parts(
        self,
        mut res: ResponseParts,
    ) -> std::result::Result<ResponseParts, Self::Error> {
        for cookie in self.0 {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    res.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(
                    cookie = cookie.cookie().name(),
                    domain = cookie.domain(),
                    error = %e,
                    "Dropping cookie that is not a valid header value"
                ),
            }
        }
        Ok(res)
    }
}

/// Host-only cookie expiring a day in the past
pub fn expired_cookie(name: &str) -> ScopedCookie {
    let cookie = Cookie::build((name.to_string(), ""))
        .path("/")
        .expires(OffsetDateTime::now_utc() - time::Duration::days(1))
        .build();
    ScopedCookie::new(cookie)
}

/// SameSite policy for cookies that must survive the provider round trip
pub fn same_site_for(secure: bool) -> SameSite {
    if secure {
        SameSite::None
    } else {
        SameSite::Lax
    }
}

/// Mints, resolves and revokes session tokens
pub struct SessionIssuer {
    store: Arc<dyn AccountStore>,
    cookie_name: String,
    host: String,
    ttl_days: i64,
}

impl SessionIssuer {
    pub fn new(store: Arc<dyn AccountStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            cookie_name: config.session_cookie.clone(),
            host: config.host.clone(),
            ttl_days: config.session_ttl_days,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Configured session lifetime in days
    pub fn ttl_days(&self) -> i64 {
        self.ttl_days
    }

    /// Mint a session token for `user` and persist its binding
    pub async fn issue(&self, user: &User, ip: IpAddr) -> Result<SessionToken> {
        let token = SessionToken::new(generate_token());
        self.store
            .log_in(SessionRecord {
                token: token.clone(),
                user_id: user.id,
                ip,
                expires_at: Utc::now() + chrono::Duration::days(self.ttl_days),
            })
            .await?;

        tracing::info!(user_id = user.id, ip = %ip, "Session issued");
        Ok(token)
    }

    /// Account behind a live session token
    pub async fn resolve(&self, token: &str) -> Result<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self.store.get_by_session(token).await?)
    }

    /// Delete the server-side binding; the caller expires the cookies
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.store.log_out(token).await?;
        tracing::info!("Session revoked");
        Ok(())
    }

    /// Cookie sequence delivering `token` for `ttl_days`
    ///
    /// A negative `ttl_days` produces cookies that are already expired.
    pub fn session_cookies(&self, token: &str, ttl_days: i64, secure: bool) -> SetCookies {
        let expires = OffsetDateTime::now_utc() + time::Duration::days(ttl_days);
        let build = || {
            Cookie::build((self.cookie_name.clone(), token.to_string()))
                .http_only(true)
                .same_site(same_site_for(secure))
                .secure(secure)
                .path("/")
                .expires(expires)
                .build()
        };

        let mut cookies = SetCookies::new();
        cookies.push(expired_cookie(&self.cookie_name));
        cookies.push(ScopedCookie::new(build()).with_domain(format!(".{}", self.host)));
        cookies.push(ScopedCookie::new(build()).with_domain(self.host.clone()));
        cookies
    }

    /// Cookie sequence that logs the browser out
    pub fn clear_cookies(&self, secure: bool) -> SetCookies {
        self.session_cookies("", -1, secure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{ExternalIdentity, MemoryAccountStore};
    use axum::response::IntoResponse;
    use crate::test_support::LOCALHOST;

    fn issuer() -> (Arc<MemoryAccountStore>, SessionIssuer) {
        let store = Arc::new(MemoryAccountStore::new());
        let config = AuthConfig {
            host: "example.com".into(),
            ..AuthConfig::default()
        };
        let issuer = SessionIssuer::new(store.clone(), &config);
        (store, issuer)
    }

    #[test]
    fn test_cookie_pair_layout() {
        let (_, issuer) = issuer();
        let cookies: Vec<_> = issuer.session_cookies("tok", 24, true).iter().cloned().collect();
        assert_eq!(cookies.len(), 3);

        let stale = &cookies[0];
        assert_eq!(stale.domain(), None);
        assert_eq!(stale.cookie().value(), "");
        assert!(stale.cookie().expires_datetime().unwrap() < OffsetDateTime::now_utc());

        assert_eq!(cookies[1].domain(), Some(".example.com"));
        assert_eq!(cookies[2].domain(), Some("example.com"));

        let expected = OffsetDateTime::now_utc() + time::Duration::days(24);
        for pair in &cookies[1..] {
            let cookie = pair.cookie();
            assert_eq!(cookie.name(), "sso-token");
            assert_eq!(cookie.value(), "tok");
            assert_eq!(cookie.http_only(), Some(true));
            assert_eq!(cookie.secure(), Some(true));
            assert_eq!(cookie.same_site(), Some(SameSite::None));
            assert_eq!(cookie.path(), Some("/"));
            let drift = cookie.expires_datetime().unwrap() - expected;
            assert!(drift.abs() < time::Duration::minutes(1));
        }
    }

    #[test]
    fn test_insecure_requests_get_lax_cookies() {
        let (_, issuer) = issuer();
        let cookies = issuer.session_cookies("tok", 24, false);
        let pair = cookies.iter().nth(1).unwrap().cookie();
        assert_eq!(pair.secure(), Some(false));
        assert_eq!(pair.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_domain_keeps_leading_dot() {
        let (_, issuer) = issuer();
        let rendered: Vec<String> = issuer
            .session_cookies("tok", 24, false)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(rendered[1].ends_with("; Domain=.example.com"));
        assert!(rendered[2].ends_with("; Domain=example.com"));
        assert!(!rendered[0].contains("Domain"));
    }

    #[test]
    fn test_clear_cookies_are_expired() {
        let (_, issuer) = issuer();
        for cookie in issuer.clear_cookies(true).iter() {
            assert_eq!(cookie.cookie().value(), "");
            assert!(cookie.cookie().expires_datetime().unwrap() < OffsetDateTime::now_utc());
        }
    }

    #[test]
    fn test_unencodable_cookie_is_skipped() {
        let mut cookies = SetCookies::new();
        cookies.push(expired_cookie("sso-token"));
        cookies.push(ScopedCookie::new(Cookie::new("sso-token", "tok")).with_domain("bad\nhost"));

        let response = (cookies, "ok").into_response();
        let headers: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].to_str().unwrap().starts_with("sso-token=;"));
    }

    #[tokio::test]
    async fn test_issue_resolve_revoke() {
        let (store, issuer) = issuer();
        let user = store
            .create_user("gina", ExternalIdentity::new("github", "5"), LOCALHOST)
            .await
            .unwrap();

        let token = issuer.issue(&user, LOCALHOST).await.unwrap();
        assert_eq!(issuer.resolve(token.as_str()).await.unwrap(), Some(user));

        issuer.revoke(token.as_str()).await.unwrap();
        assert!(issuer.resolve(token.as_str()).await.unwrap().is_none());
        assert!(issuer.resolve("").await.unwrap().is_none());
    }
}
