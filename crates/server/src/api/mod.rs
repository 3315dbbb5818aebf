pub mod auth;
pub mod health;
pub mod proxy;
pub mod share;
pub mod upload;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::response::Response;
use axum::routing::{any, get, post};
use darkroom_core::CallerIdentity;
use darkroom_gateway::{
    AssetScope, ClaimsAssetScope, CredentialResolver, ProxyForwarder, ProxyRequest, ProxyResponse,
    ShareGate, UploadIngestor,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::OperatorAuth;
use crate::config::DarkroomConfig;
use crate::error::ServerError;

/// Shared application state passed to all handlers. Every field is immutable
/// and cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub resolver: CredentialResolver,
    pub forwarder: ProxyForwarder,
    pub uploads: UploadIngestor,
    pub share: ShareGate,
    pub auth: OperatorAuth,
    /// Body size ceiling applied to every route.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wire every component from `config`, using [`ClaimsAssetScope`] for
    /// share links.
    pub fn from_config(config: &DarkroomConfig) -> Result<Self, ServerError> {
        Self::with_scope(config, Arc::new(ClaimsAssetScope))
    }

    /// Wire every component from `config` with a custom share scope.
    pub fn with_scope(
        config: &DarkroomConfig,
        scope: Arc<dyn AssetScope>,
    ) -> Result<Self, ServerError> {
        let gateway_config = Arc::new(config.gateway_config());
        let codec = Arc::new(config.token_codec());

        let resolver = CredentialResolver::new(Arc::clone(&gateway_config));
        let forwarder = ProxyForwarder::new(gateway_config)?;
        let uploads = UploadIngestor::new(forwarder.clone(), resolver.clone());
        let share = ShareGate::new(Arc::clone(&codec), scope);
        let auth = OperatorAuth::new(
            config.auth.mode,
            codec,
            config.session.ttl(),
            config.session.secure_cookie,
        );

        Ok(Self {
            resolver,
            forwarder,
            uploads,
            share,
            auth,
            max_body_bytes: config.server.max_upload_bytes,
        })
    }

    /// Resolve credentials for `identity` and relay `request` upstream.
    pub(crate) async fn forward_as(
        &self,
        identity: &CallerIdentity,
        request: ProxyRequest,
    ) -> Result<Response, ServerError> {
        let headers = self.resolver.resolve(identity)?;
        let response = self.forwarder.forward(request, headers).await?;
        Ok(relay(response))
    }
}

/// Build the Axum router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(health::health))
        // Operator session
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        // Operator entry points
        .route("/api/upstream/{*path}", any(proxy::forward))
        .route("/api/upload", post(upload::upload))
        .route("/api/share/link", post(share::create_link))
        .route("/api/share/asset-link", post(share::create_asset_link))
        // Token-gated entry points
        .route("/api/share/info", get(share::info))
        .route("/api/share/thumbnail/{asset_id}", get(share::thumbnail))
        .route("/api/share/original/{asset_id}", get(share::original))
        .route("/api/share/download", post(share::download))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Turn a relayed upstream response into an Axum response, status and
/// filtered headers unchanged.
pub(crate) fn relay(response: ProxyResponse) -> Response {
    let mut out = Response::new(Body::from(response.body.into_bytes()));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}
