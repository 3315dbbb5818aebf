use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use darkroom_core::CallerIdentity;

use crate::api::AppState;
use crate::error::ServerError;

/// Extractor yielding the operator's identity, or rejecting with 401 before
/// the handler runs.
#[derive(Debug)]
pub struct Operator(pub CallerIdentity);

impl FromRequestParts<AppState> for Operator {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.auth.identify(&parts.headers)?;
        tracing::debug!(identity = %identity.kind(), "operator identified");
        Ok(Self(identity))
    }
}
