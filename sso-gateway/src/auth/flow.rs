//! Sign-in initiation and callback completion

use axum::{
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::Cookie;
use oauth2::url::{form_urlencoded, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::identity::{IdentityResolver, Resolution};
use super::registry::AuthServiceRegistry;
use super::session::{expired_cookie, same_site_for, ScopedCookie, SessionIssuer, SetCookies};
use super::state::{AuthAttemptState, CompletionMode};
use crate::config::AuthConfig;
use crate::error::{Error, Result, ACCESS_DENIED_MESSAGE};
use crate::extract::RequestOrigin;

/// Query parameters a provider may send back to the callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Read a raw query string; the first value of a repeated key wins
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "state" => &mut params.state,
                "code" => &mut params.code,
                "oauth_token" => &mut params.oauth_token,
                "oauth_verifier" => &mut params.oauth_verifier,
                "error" => &mut params.error,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Whether the query looks like a provider callback rather than a sign-in request
    pub fn is_callback(&self) -> bool {
        self.state.is_some()
            || self.code.is_some()
            || self.error.is_some()
            || self.oauth_token.is_some()
    }
}

/// One-time code from the callback query
///
/// Prefers `code`; OAuth 1 style callbacks yield `oauth_token|oauth_verifier`.
pub fn extract_code(params: &CallbackParams) -> Option<String> {
    if let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) {
        return Some(code.to_string());
    }
    match (params.oauth_token.as_deref(), params.oauth_verifier.as_deref()) {
        (Some(token), Some(verifier)) if !token.is_empty() && !verifier.is_empty() => {
            Some(format!("{}|{}", token, verifier))
        }
        _ => None,
    }
}

/// Terminal outcome of a callback, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    UnknownService,
    ProviderError,
    StateInvalid,
    CodeMissing,
    TokenExchangeFailed,
    IdentifierInvalid,
    RegistrationClosed,
    SignupRequired,
    SessionIssued,
    Failed,
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowOutcome::UnknownService => "unknown_service",
            FlowOutcome::ProviderError => "provider_error",
            FlowOutcome::StateInvalid => "state_invalid",
            FlowOutcome::CodeMissing => "code_missing",
            FlowOutcome::TokenExchangeFailed => "token_exchange_failed",
            FlowOutcome::IdentifierInvalid => "identifier_invalid",
            FlowOutcome::RegistrationClosed => "registration_closed",
            FlowOutcome::SignupRequired => "signup_required",
            FlowOutcome::SessionIssued => "session_issued",
            FlowOutcome::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// JSON body of a successful callback or signup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub signup: bool,
}

/// JSON body of a non-redirecting sign-in request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResponse {
    pub redirect_url: String,
}

/// Where a sign-in request sends the browser
#[derive(Debug)]
pub struct SignInTarget {
    pub url: String,
    pub mode: CompletionMode,
    pub cookies: SetCookies,
}

impl IntoResponse for SignInTarget {
    fn into_response(self) -> Response {
        match self.mode {
            CompletionMode::Redirect => {
                (StatusCode::FOUND, self.cookies, [(LOCATION, self.url)]).into_response()
            }
            CompletionMode::Json => (
                self.cookies,
                Json(SignInResponse {
                    redirect_url: self.url,
                }),
            )
                .into_response(),
        }
    }
}

/// Body of a callback response
#[derive(Debug)]
pub enum CallbackReply {
    /// 302 to the completion page
    Redirect(String),

    /// Inline token
    Success { token: String, signup: bool },

    /// Structured JSON error
    Failure(Error),
}

/// Result of [`OAuthFlowController::complete_callback`]
#[derive(Debug)]
pub struct CallbackResponse {
    pub cookies: SetCookies,
    pub reply: CallbackReply,
    pub outcome: FlowOutcome,
}

impl IntoResponse for CallbackResponse {
    fn into_response(self) -> Response {
        match self.reply {
            CallbackReply::Redirect(url) => {
                (StatusCode::FOUND, self.cookies, [(LOCATION, url)]).into_response()
            }
            CallbackReply::Success { token, signup } => (
                self.cookies,
                Json(AuthResponse {
                    success: true,
                    token,
                    signup,
                }),
            )
                .into_response(),
            CallbackReply::Failure(err) => (self.cookies, err).into_response(),
        }
    }
}

/// Orchestrates the provider round trip
pub struct OAuthFlowController {
    registry: Arc<AuthServiceRegistry>,
    resolver: Arc<IdentityResolver>,
    sessions: Arc<SessionIssuer>,
    completion_url: Url,
    redirect_cookie: String,
    redirect_cookie_ttl_secs: u64,
}

impl OAuthFlowController {
    pub fn new(
        config: &AuthConfig,
        registry: Arc<AuthServiceRegistry>,
        resolver: Arc<IdentityResolver>,
        sessions: Arc<SessionIssuer>,
    ) -> Result<Self> {
        let completion_url = Url::parse(&config.completion_url())
            .map_err(|e| Error::Internal(format!("Invalid completion URL: {}", e)))?;

        Ok(Self {
            registry,
            resolver,
            sessions,
            completion_url,
            redirect_cookie: config.redirect_cookie.clone(),
            redirect_cookie_ttl_secs: config.redirect_cookie_ttl_secs,
        })
    }

    pub fn redirect_cookie_name(&self) -> &str {
        &self.redirect_cookie
    }

    /// Start a sign-in attempt with `provider_key`
    pub fn initiate_sign_in(
        &self,
        provider_key: &str,
        wants_redirect: bool,
        secure: bool,
    ) -> Result<SignInTarget> {
        let provider = self.registry.lookup(provider_key)?;
        let raw = provider.generate_state();

        let mut cookies = SetCookies::new();
        let mode = if wants_redirect {
            let marker = Cookie::build((self.redirect_cookie.clone(), "1"))
                .same_site(same_site_for(secure))
                .secure(secure)
                .path("/")
                .max_age(time::Duration::seconds(
                    i64::try_from(self.redirect_cookie_ttl_secs).unwrap_or(i64::MAX),
                ))
                .build();
            cookies.push(ScopedCookie::new(marker));
            CompletionMode::Redirect
        } else {
            CompletionMode::Json
        };

        let state = AuthAttemptState::new(raw, mode);
        tracing::debug!(provider = provider_key, ?mode, "Sign-in initiated");

        Ok(SignInTarget {
            url: provider.redirect_url(&state.to_string()),
            mode,
            cookies,
        })
    }

    /// Finish a sign-in attempt from the provider's callback
    pub async fn complete_callback(
        &self,
        provider_key: &str,
        params: &CallbackParams,
        redirect_marker_present: bool,
        origin: &RequestOrigin,
    ) -> CallbackResponse {
        let mut cookies = SetCookies::new();
        cookies.push(expired_cookie(&self.redirect_cookie));

        let (reply, outcome) = self
            .run_callback(
                provider_key,
                params,
                redirect_marker_present,
                origin,
                &mut cookies,
            )
            .await;

        match (&reply, outcome) {
            (CallbackReply::Failure(err), FlowOutcome::Failed) => {
                tracing::error!(provider = provider_key, %outcome, error = %err, "Sign-in failed");
            }
            (CallbackReply::Failure(err), _) => {
                tracing::warn!(provider = provider_key, %outcome, code = err.code(), "Sign-in rejected");
            }
            _ => tracing::info!(provider = provider_key, %outcome, "Sign-in completed"),
        }

        CallbackResponse {
            cookies,
            reply,
            outcome,
        }
    }

    async fn run_callback(
        &self,
        provider_key: &str,
        params: &CallbackParams,
        redirect_marker_present: bool,
        origin: &RequestOrigin,
        cookies: &mut SetCookies,
    ) -> (CallbackReply, FlowOutcome) {
        let provider = match self.registry.lookup(provider_key) {
            Ok(provider) => provider,
            Err(err) => return (CallbackReply::Failure(err), FlowOutcome::UnknownService),
        };

        let state: AuthAttemptState = params
            .state
            .as_deref()
            .unwrap_or_default()
            .parse()
            .unwrap_or_else(|never| match never {});
        let mode = state.resolve_mode(redirect_marker_present);
        tracing::debug!(provider = provider_key, ?mode, "Completion mode resolved");

        if let Some(error) = &params.error {
            let message = if error == "access_denied" {
                ACCESS_DENIED_MESSAGE.to_string()
            } else {
                error.clone()
            };
            return (
                self.no_login(mode, Error::OAuth(message)),
                FlowOutcome::ProviderError,
            );
        }

        // Consumes the state before anything reaches the network
        if !provider.verify_state(&state.raw) {
            return (CallbackReply::Failure(Error::BadState), FlowOutcome::StateInvalid);
        }

        let Some(code) = extract_code(params) else {
            return (self.no_login(mode, Error::MissingCode), FlowOutcome::CodeMissing);
        };

        let token = match provider.get_token(&code).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                return (
                    CallbackReply::Failure(Error::InvalidCode),
                    FlowOutcome::TokenExchangeFailed,
                )
            }
            Err(e) => {
                tracing::warn!(provider = provider_key, error = %e, "Token exchange failed");
                return (
                    CallbackReply::Failure(Error::InvalidCode),
                    FlowOutcome::TokenExchangeFailed,
                );
            }
        };

        let identifier = match provider.get_identifier(&token).await {
            Ok(identifier) => identifier,
            Err(e) => {
                return (
                    CallbackReply::Failure(Error::InvalidAccount(e.to_string())),
                    FlowOutcome::IdentifierInvalid,
                )
            }
        };

        match self
            .resolver
            .resolve_or_prepare_signup(provider.as_ref(), &identifier)
            .await
        {
            Ok(Resolution::Existing(user)) => {
                let token = match self.sessions.issue(&user, origin.ip).await {
                    Ok(token) => token,
                    Err(err) => return (CallbackReply::Failure(err), FlowOutcome::Failed),
                };
                cookies.append(self.sessions.session_cookies(
                    token.as_str(),
                    self.sessions.ttl_days(),
                    origin.secure,
                ));
                (
                    self.success(mode, token.as_str(), false),
                    FlowOutcome::SessionIssued,
                )
            }
            Ok(Resolution::Signup(token)) => (
                self.success(mode, token.as_str(), true),
                FlowOutcome::SignupRequired,
            ),
            Err(err @ Error::InvalidServiceOperation) => {
                (CallbackReply::Failure(err), FlowOutcome::RegistrationClosed)
            }
            Err(err) => (CallbackReply::Failure(err), FlowOutcome::Failed),
        }
    }

    fn completion_target(&self, pairs: &[(&str, &str)]) -> String {
        let mut url = self.completion_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in pairs {
                query.append_pair(name, value);
            }
        }
        url.to_string()
    }

    fn no_login(&self, mode: CompletionMode, err: Error) -> CallbackReply {
        match mode {
            CompletionMode::Redirect => {
                CallbackReply::Redirect(self.completion_target(&[("nologin", "1")]))
            }
            CompletionMode::Json => CallbackReply::Failure(err),
        }
    }

    fn success(&self, mode: CompletionMode, token: &str, signup: bool) -> CallbackReply {
        match mode {
            CompletionMode::Redirect => CallbackReply::Redirect(self.completion_target(&[
                ("token", token),
                ("signup", if signup { "true" } else { "false" }),
            ])),
            CompletionMode::Json => CallbackReply::Success {
                token: token.to_string(),
                signup,
            },
        }
    }
}
