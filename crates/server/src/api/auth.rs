use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use darkroom_gateway::exchange_credentials;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::cookie::{expired_session_cookie, session_cookie};
use crate::error::ServerError;

use super::AppState;

/// Body of `POST /api/auth/login`.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub authenticated: bool,
    pub expires_in: u64,
}

/// `POST /api/auth/login` -- trade upstream credentials for a session cookie.
///
/// The upstream bearer token never reaches the browser in clear; it travels
/// inside the signed, HttpOnly `darkroom_session` cookie.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let access_token =
        exchange_credentials(&state.forwarder, &request.email, &request.password).await?;
    let session = state.auth.mint_session(&access_token)?;
    let ttl = state.auth.session_ttl();
    info!(ttl_seconds = ttl.as_secs(), "operator session started");

    let cookie = session_cookie(&session, ttl, state.auth.secure_cookie());
    let body = LoginResponse {
        authenticated: true,
        expires_in: ttl.as_secs(),
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// `POST /api/auth/logout` -- drop the session cookie. Tokens are not
/// revocable; the cookie is simply expired on the client.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, expired_session_cookie(state.auth.secure_cookie()))],
        Json(serde_json::json!({ "authenticated": false })),
    )
}
