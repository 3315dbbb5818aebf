use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use darkroom_gateway::GatewayError;
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur when running the Darkroom server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener, reading the config file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A gateway-level error surfaced through the API.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The inbound request could not be parsed (bad JSON, bad multipart).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The inbound body exceeded `server.max_upload_bytes`.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Gateway(e) => match e {
                GatewayError::Unauthenticated(_)
                | GatewayError::TokenExpired
                | GatewayError::TokenMalformed(_) => StatusCode::UNAUTHORIZED,
                GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
                GatewayError::NoFileReceived | GatewayError::InvalidTtl(_) => {
                    StatusCode::BAD_REQUEST
                }
                GatewayError::Configuration(_) | GatewayError::Upstream(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Short machine-readable name used in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration_error",
            Self::Io(_) => "io_error",
            Self::Gateway(e) => e.kind(),
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(kind = self.kind(), error = %message, "request failed");
        } else {
            warn!(kind = self.kind(), status = status.as_u16(), error = %message, "request rejected");
        }

        let body = serde_json::json!({ "error": self.kind(), "message": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_statuses() {
        let cases = [
            (GatewayError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (GatewayError::TokenExpired, StatusCode::UNAUTHORIZED),
            (GatewayError::TokenMalformed("x".into()), StatusCode::UNAUTHORIZED),
            (GatewayError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (GatewayError::Configuration("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (GatewayError::NoFileReceived, StatusCode::BAD_REQUEST),
            (GatewayError::InvalidTtl("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::Upstream("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
        assert_eq!(
            ServerError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn response_carries_kind_and_message() {
        let response = ServerError::from(GatewayError::Upstream("connection refused".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn kinds_follow_gateway_taxonomy() {
        assert_eq!(ServerError::from(GatewayError::TokenExpired).kind(), "token_expired");
        assert_eq!(ServerError::Config("x".into()).kind(), "configuration_error");
        assert_eq!(ServerError::BadRequest("x".into()).kind(), "bad_request");
    }
}
