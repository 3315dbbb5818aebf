use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use darkroom_gateway::{ProxyBody, ProxyRequest};
use tracing::instrument;

use crate::auth::Operator;
use crate::error::ServerError;

use super::AppState;

/// Mount point of the generic proxy.
pub const PROXY_PREFIX: &str = "/api/upstream";

/// `ANY /api/upstream/{*path}` -- relay any request to the upstream service
/// under the operator's credentials.
///
/// The suffix after the mount point, query string included, is appended to
/// the upstream base verbatim. Percent-encoding is preserved.
#[instrument(skip_all, fields(method = %method))]
pub async fn forward(
    State(state): State<AppState>,
    Operator(identity): Operator,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let suffix = uri.path().strip_prefix(PROXY_PREFIX).unwrap_or(uri.path());
    let path = match uri.query() {
        Some(query) => format!("{suffix}?{query}"),
        None => suffix.to_owned(),
    };

    let content_type = headers.get(CONTENT_TYPE).cloned();
    let body = ProxyBody::from_bytes(body, content_type.as_ref().and_then(|v| v.to_str().ok()));
    let request = ProxyRequest::new(method, path).with_body(body, content_type);

    state.forward_as(&identity, request).await
}
