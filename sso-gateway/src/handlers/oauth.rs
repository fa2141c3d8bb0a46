//! Sign-in, callback, service listing and signup handlers

use axum::{
    extract::{Path, RawQuery, State},
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use oauth2::url::form_urlencoded;
use serde::{Deserialize, Serialize};

use crate::auth::registry::ServiceInfo;
use crate::auth::CallbackParams;
use crate::error::{Error, Result};
use crate::extract::RequestOrigin;
use crate::state::AppState;

/// Whether a sign-in query asks for a browser redirect
///
/// Presence of `redirect` is enough; its value is ignored.
fn wants_redirect(query: Option<&str>) -> bool {
    query.is_some_and(|q| form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == "redirect"))
}

/// `GET /signin/{provider}`
pub async fn sign_in(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    RawQuery(query): RawQuery,
    origin: RequestOrigin,
) -> Result<Response> {
    let target = state.flow().initiate_sign_in(
        &provider,
        wants_redirect(query.as_deref()),
        origin.secure,
    )?;
    Ok(target.into_response())
}

/// `GET /auth/{provider}`
///
/// Starts a sign-in unless the query carries a provider callback. The query
/// is read leniently so a malformed or repeated parameter still reaches the
/// callback and clears the pending-redirect cookie.
pub async fn auth(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    RawQuery(query): RawQuery,
    jar: CookieJar,
    origin: RequestOrigin,
) -> Result<Response> {
    let flow = state.flow();
    let params = CallbackParams::from_query(query.as_deref().unwrap_or_default());

    if !params.is_callback() {
        let target =
            flow.initiate_sign_in(&provider, wants_redirect(query.as_deref()), origin.secure)?;
        return Ok(target.into_response());
    }

    let marker_present = jar.get(flow.redirect_cookie_name()).is_some();
    let response = flow
        .complete_callback(&provider, &params, marker_present, &origin)
        .await;
    Ok(response.into_response())
}

/// Body of `GET /auth`
#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub services: Vec<ServiceInfo>,
    pub registration_enabled: bool,
}

/// `GET /auth`
pub async fn services(State(state): State<AppState>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: state.registry().enabled_services(),
        registration_enabled: state.resolver().is_registration_enabled(),
    })
}

/// Form posted by the signup page
#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    pub username: Option<String>,
    pub token: Option<String>,
}

/// Body of a successful signup
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub token: String,
}

/// `POST /signup`
///
/// Redeems a signup token for a new account and logs it in.
pub async fn signup(
    State(state): State<AppState>,
    origin: RequestOrigin,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    if !state.resolver().is_registration_enabled() {
        return Err(Error::RegistrationDisabled);
    }
    let (Some(username), Some(token)) = (form.username, form.token) else {
        return Err(Error::BadParams);
    };

    let user = state
        .resolver()
        .complete_signup(&token, &username, origin.ip)
        .await?;

    let sessions = state.sessions();
    let session = sessions.issue(&user, origin.ip).await?;
    let cookies = sessions.session_cookies(session.as_str(), sessions.ttl_days(), origin.secure);

    Ok((
        cookies,
        Json(SignupResponse {
            token: session.as_str().to_string(),
        }),
    )
        .into_response())
}
