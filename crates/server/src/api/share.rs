use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use darkroom_core::ShareClaims;
use darkroom_gateway::ThumbnailSize;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::Operator;
use crate::error::ServerError;

use super::AppState;

/// `?token=` on the token-gated endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Query for `GET /api/share/thumbnail/{asset_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct ThumbnailQuery {
    pub token: Option<String>,
    #[serde(default)]
    pub size: ThumbnailSize,
}

/// Body of `POST /api/share/link`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub claims: ShareClaims,
    /// Omit for a link that never expires.
    pub ttl_seconds: Option<u64>,
}

/// Body of `POST /api/share/asset-link`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetLinkRequest {
    pub asset_id: String,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfoResponse {
    pub claims: ShareClaims,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// `POST /api/share/link` -- sign a share link over filter claims.
#[instrument(skip_all)]
pub async fn create_link(
    State(state): State<AppState>,
    Operator(_operator): Operator,
    body: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ServerError> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let ttl = ttl(request.ttl_seconds)?;
    let token = state.share.issue_link(&request.claims, ttl)?;
    info!(ttl_seconds = request.ttl_seconds, "share link issued");
    link_response(&state, token)
}

/// `POST /api/share/asset-link` -- sign a link to a single asset.
#[instrument(skip_all)]
pub async fn create_asset_link(
    State(state): State<AppState>,
    Operator(_operator): Operator,
    body: Result<Json<CreateAssetLinkRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ServerError> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let ttl = ttl(request.ttl_seconds)?;
    let token = state.share.issue_asset_link(&request.asset_id, ttl)?;
    info!(asset_id = %request.asset_id, ttl_seconds = request.ttl_seconds, "asset link issued");
    link_response(&state, token)
}

/// `GET /api/share/info?token=` -- the verified claims behind a link.
pub async fn info(
    State(state): State<AppState>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> Result<Json<ShareInfoResponse>, ServerError> {
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let verified = state.share.inspect(query.token.as_deref())?;
    Ok(Json(ShareInfoResponse {
        claims: verified.claims,
        issued_at: verified.issued_at,
        expires_at: verified.expires_at,
    }))
}

/// `GET /api/share/thumbnail/{asset_id}?token=&size=` -- token-gated
/// thumbnail under the share API key.
#[instrument(skip_all, fields(asset_id = %asset_id))]
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    query: Result<Query<ThumbnailQuery>, QueryRejection>,
) -> Result<Response, ServerError> {
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let (identity, request) = state
        .share
        .thumbnail(query.token.as_deref(), &asset_id, query.size)
        .await?;
    state.forward_as(&identity, request).await
}

/// `GET /api/share/original/{asset_id}?token=` -- token-gated original file.
#[instrument(skip_all, fields(asset_id = %asset_id))]
pub async fn original(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> Result<Response, ServerError> {
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let (identity, request) = state
        .share
        .original(query.token.as_deref(), &asset_id)
        .await?;
    state.forward_as(&identity, request).await
}

/// `POST /api/share/download?token=` -- archive of every asset the link
/// covers.
#[instrument(skip_all)]
pub async fn download(
    State(state): State<AppState>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> Result<Response, ServerError> {
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let (identity, request) = state.share.download(query.token.as_deref()).await?;
    state.forward_as(&identity, request).await
}

/// Zero would mint a token that is already expired.
fn ttl(seconds: Option<u64>) -> Result<Option<Duration>, ServerError> {
    match seconds {
        Some(0) => Err(ServerError::BadRequest(
            "ttlSeconds must be positive; omit it for a link that never expires".to_owned(),
        )),
        other => Ok(other.map(Duration::from_secs)),
    }
}

fn link_response(state: &AppState, token: String) -> Result<Json<LinkResponse>, ServerError> {
    let expires_at = state.share.inspect(Some(&token))?.expires_at;
    Ok(Json(LinkResponse { token, expires_at }))
}
