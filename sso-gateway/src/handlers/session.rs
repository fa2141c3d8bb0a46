//! Session inspection and logout

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extract::RequestOrigin;
use crate::state::AppState;

/// Name reported for anonymous callers
pub const ANONYMOUS_NAME: &str = "unauthed";

/// Body of `GET /whoami`
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub username: String,
    pub id: i64,
}

/// `GET /whoami`
pub async fn whoami(State(state): State<AppState>, jar: CookieJar) -> Result<Json<WhoAmIResponse>> {
    let sessions = state.sessions();
    let token = jar
        .get(sessions.cookie_name())
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    let response = match sessions.resolve(&token).await? {
        Some(user) => WhoAmIResponse {
            username: user.name,
            id: user.id,
        },
        None => WhoAmIResponse {
            username: ANONYMOUS_NAME.to_string(),
            id: -1,
        },
    };
    Ok(Json(response))
}

/// Body of `/logout`
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// `GET|POST /logout`
///
/// Revokes the presented session and expires the cookie pair either way.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    origin: RequestOrigin,
) -> Result<Response> {
    let sessions = state.sessions();
    if let Some(cookie) = jar.get(sessions.cookie_name()) {
        if !cookie.value().is_empty() {
            sessions.revoke(cookie.value()).await?;
        }
    }

    Ok((
        sessions.clear_cookies(origin.secure),
        Json(LogoutResponse { success: true }),
    )
        .into_response())
}
