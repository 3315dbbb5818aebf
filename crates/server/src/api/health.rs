use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::AppState;

/// Liveness body. Reports which secrets are present, never their values.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub auth_mode: &'static str,
    pub signing_secret_configured: bool,
    pub api_key_configured: bool,
    pub share_api_key_configured: bool,
}

/// `GET /health` -- liveness plus a configuration summary.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.forwarder.config();
    let body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        auth_mode: state.auth.mode().as_str(),
        signing_secret_configured: state.auth.token_configured(),
        api_key_configured: config.api_key().is_some(),
        share_api_key_configured: config.share_api_key().is_some(),
    };
    (StatusCode::OK, Json(body))
}
