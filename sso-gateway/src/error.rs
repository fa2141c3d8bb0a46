//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::accounts::StoreError;

/// Message surfaced when a provider reports `access_denied`
pub const ACCESS_DENIED_MESSAGE: &str = "Authentication denied by user";

/// Result type alias using the gateway error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway
///
/// Sign-in failures carry the wire code the front end switches on
/// (`bad_service`, `bad_state`, ...). Infrastructure failures are logged and
/// reported as opaque internal errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account collaborator failure
    #[error("Account store error: {0}")]
    Store(#[from] StoreError),

    /// Unknown or inert provider key
    #[error("No auth service named {0}")]
    BadService(String),

    /// State token missing, unknown, expired or already used
    #[error("Invalid state token")]
    BadState,

    /// Callback carried neither `code` nor `oauth_token`/`oauth_verifier`
    #[error("No OAuth code specified")]
    MissingCode,

    /// Provider rejected the authorization code
    #[error("OAuth code invalid")]
    InvalidCode,

    /// Provider reported an error on the callback
    #[error("{0}")]
    OAuth(String),

    /// Provider refused to resolve the account identifier
    #[error("{0}")]
    InvalidAccount(String),

    /// Unknown identity while registration is disabled for the provider
    #[error("Registration is currently disabled for this service. Please try one of the other ones.")]
    InvalidServiceOperation,

    /// Signup attempted while the global registration switch is off
    #[error("Registration has been disabled")]
    RegistrationDisabled,

    /// Signup form missing a field
    #[error("Missing parameters")]
    BadParams,

    /// Signup token empty, unknown or already redeemed
    #[error("{0}")]
    BadSignupToken(String),

    /// Requested username rejected
    #[error("{0}")]
    BadUsername(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request; the message is shown to the caller verbatim
    #[error("{0}")]
    BadRequest(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Wire code reported in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Io(_) | Error::Store(_) | Error::Internal(_) => "internal_error",
            Error::BadService(_) => "bad_service",
            Error::BadState => "bad_state",
            Error::MissingCode | Error::InvalidCode => "bad_code",
            Error::OAuth(_) => "oauth_error",
            Error::InvalidAccount(_) => "invalid_account",
            Error::InvalidServiceOperation => "invalid_service_operation",
            Error::RegistrationDisabled => "registration_disabled",
            Error::BadParams => "bad_params",
            Error::BadSignupToken(_) => "bad_token",
            Error::BadUsername(_) => "bad_username",
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) => "bad_request",
        }
    }

    /// HTTP status the error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Config(_) | Error::Io(_) | Error::Store(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::BadService(_)
            | Error::BadState
            | Error::MissingCode
            | Error::BadParams
            | Error::BadSignupToken(_)
            | Error::BadUsername(_)
            | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCode
            | Error::OAuth(_)
            | Error::InvalidAccount(_)
            | Error::InvalidServiceOperation
            | Error::RegistrationDisabled
            | Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,

    /// Machine-readable error code
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Optional structured details
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create an error response with a code
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        if err.is_internal() {
            // Internal detail stays in the logs
            return ErrorResponse::with_code(err.code(), "Internal server error");
        }
        ErrorResponse::with_code(err.code(), err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(code = self.code(), "{}", self);
        }
        let status = self.status();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
