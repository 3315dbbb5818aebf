use darkroom_crypto::TokenError;
use thiserror::Error;

/// Errors that can occur while resolving credentials or relaying a request to
/// the upstream media service.
///
/// Upstream business errors (an upstream 404, say) are not represented here:
/// they are relayed verbatim as a successful [`ProxyResponse`](crate::ProxyResponse).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No identity could be established for the request.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The capability token carried an expiry that has passed.
    #[error("token expired")]
    TokenExpired,

    /// The capability token failed signature or payload checks.
    #[error("malformed token: {0}")]
    TokenMalformed(String),

    /// A valid token that does not grant the requested resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A requested token lifetime that cannot be signed.
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),

    /// A required secret or API key is not configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An upload stream ended without a file part.
    #[error("no file received")]
    NoFileReceived,

    /// The upstream service could not be reached or its response could not be
    /// read.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Configuration(msg) => Self::Configuration(msg),
            TokenError::Expired => Self::TokenExpired,
            TokenError::Malformed(msg) => Self::TokenMalformed(msg),
            TokenError::InvalidTtl(msg) => Self::InvalidTtl(msg),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("upstream request timed out: {err}"))
        } else if err.is_connect() {
            Self::Upstream(format!("upstream unreachable: {err}"))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl GatewayError {
    /// Short machine-readable name used in error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::TokenExpired => "token_expired",
            Self::TokenMalformed(_) => "token_malformed",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTtl(_) => "invalid_ttl",
            Self::Configuration(_) => "configuration_error",
            Self::NoFileReceived => "no_file_received",
            Self::Upstream(_) => "gateway_error",
        }
    }
}
