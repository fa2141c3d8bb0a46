//! Trusted bridge handler

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::BridgeAssertion;
use crate::error::{Error, Result};
use crate::extract::RequestOrigin;
use crate::middleware::BRIDGE_TOKEN_HEADER;
use crate::state::AppState;

/// Body returned to the partner
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub success: bool,
    pub token: String,
    pub user_id: i64,
    pub username: String,
}

/// `POST /auth/bridge`
pub async fn bridge(
    State(state): State<AppState>,
    origin: RequestOrigin,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let issuer = state.bridge();
    let presented = headers
        .get(BRIDGE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    issuer.authorize(presented)?;

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| Error::BadRequest("Invalid data".into()))?;
    let assertion = BridgeAssertion::from_json(&value)?;

    let session = issuer.issue(&assertion, origin.ip).await?;
    tracing::info!(
        user_id = session.user_id,
        username = %session.username,
        "Bridge session issued"
    );

    let sessions = state.sessions();
    let cookies =
        sessions.session_cookies(session.token.as_str(), sessions.ttl_days(), origin.secure);

    Ok((
        cookies,
        Json(BridgeResponse {
            success: true,
            token: session.token.as_str().to_string(),
            user_id: session.user_id,
            username: session.username,
        }),
    )
        .into_response())
}
