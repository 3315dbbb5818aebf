pub mod cookie;
pub mod extract;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use darkroom_core::{CallerIdentity, SessionClaims};
use darkroom_crypto::TokenCodec;
use darkroom_gateway::GatewayError;
use tracing::debug;

use self::cookie::{SESSION_COOKIE, read_cookie};
use crate::config::AuthMode;

pub use self::extract::Operator;

/// Establishes operator identity for the operator entry points.
///
/// In [`AuthMode::Session`] the identity comes from the signed session
/// cookie, which carries the operator's own upstream bearer token. In
/// [`AuthMode::ApiKey`] every operator request acts with the service key.
#[derive(Debug, Clone)]
pub struct OperatorAuth {
    mode: AuthMode,
    codec: Arc<TokenCodec>,
    session_ttl: Duration,
    secure_cookie: bool,
}

impl OperatorAuth {
    pub fn new(
        mode: AuthMode,
        codec: Arc<TokenCodec>,
        session_ttl: Duration,
        secure_cookie: bool,
    ) -> Self {
        Self {
            mode,
            codec,
            session_ttl,
            secure_cookie,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn secure_cookie(&self) -> bool {
        self.secure_cookie
    }

    /// Whether the shared signing secret is set.
    pub fn token_configured(&self) -> bool {
        self.codec.is_configured()
    }

    /// Resolve the operator behind a request from its headers.
    pub fn identify(&self, headers: &HeaderMap) -> Result<CallerIdentity, GatewayError> {
        match self.mode {
            AuthMode::ApiKey => Ok(CallerIdentity::ApiKey),
            AuthMode::Session => {
                let token = read_cookie(headers, SESSION_COOKIE).ok_or_else(|| {
                    GatewayError::Unauthenticated("no operator session".to_owned())
                })?;
                let claims: SessionClaims = self.codec.verify(token)?;
                debug!("operator session verified");
                Ok(CallerIdentity::session(claims.access_token))
            }
        }
    }

    /// Sign a session token wrapping the operator's upstream bearer token.
    pub fn mint_session(&self, access_token: &str) -> Result<String, GatewayError> {
        let claims = SessionClaims {
            access_token: access_token.to_owned(),
        };
        Ok(self.codec.issue(&claims, Some(self.session_ttl))?)
    }
}
