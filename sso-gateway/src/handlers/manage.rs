//! Operator command endpoint

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::auth::constant_time_compare;
use crate::auth::registry::ServiceInfo;
use crate::error::{Error, Result};
use crate::middleware::MANAGE_TOKEN_HEADER;
use crate::state::AppState;

/// Operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageCommand {
    /// Liveness check for the operator channel
    Ping,

    /// Re-read configuration and flip provider and registration switches
    Reload,

    /// List usable providers
    Services,
}

#[derive(Debug, Deserialize)]
pub struct ManageRequest {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct ManageResponse {
    pub success: bool,
    pub command: ManageCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceInfo>>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<()> {
    // No token configured means the endpoint does not exist
    let Some(expected) = state
        .config()
        .management
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
    else {
        return Err(Error::NotFound("management endpoint".into()));
    };

    let presented = headers
        .get(MANAGE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !constant_time_compare(expected, presented) {
        tracing::warn!("Management request with missing or wrong token");
        return Err(Error::Unauthorized("Invalid management token".into()));
    }
    Ok(())
}

fn parse_command(raw: &str) -> Result<ManageCommand> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ping" => Ok(ManageCommand::Ping),
        "reload" => Ok(ManageCommand::Reload),
        "services" => Ok(ManageCommand::Services),
        other => Err(Error::BadRequest(format!("Unknown command: {}", other))),
    }
}

/// `POST /manage`
pub async fn manage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ManageRequest>,
) -> Result<Json<ManageResponse>> {
    authorize(&state, &headers)?;
    let command = parse_command(&request.command)?;
    tracing::info!(?command, "Management command");

    let services = match command {
        ManageCommand::Ping => None,
        ManageCommand::Reload => Some(state.reload()?),
        ManageCommand::Services => Some(state.registry().enabled_services()),
    };

    Ok(Json(ManageResponse {
        success: true,
        command,
        services,
    }))
}
