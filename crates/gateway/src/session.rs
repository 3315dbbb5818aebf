use reqwest::StatusCode;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::GatewayError;
use crate::forwarder::ProxyForwarder;

/// Upstream endpoint that trades operator credentials for a bearer token.
pub const LOGIN_PATH: &str = "/auth/login";

/// Exchange an operator's email and password for an upstream access token.
///
/// This is the only upstream call made without credential headers. Rejected
/// credentials (upstream 400 or 401) surface as
/// [`GatewayError::Unauthenticated`]; any other non-success, or a success
/// without an `accessToken`, is an upstream failure.
#[instrument(skip(forwarder, password))]
pub async fn exchange_credentials(
    forwarder: &ProxyForwarder,
    email: &str,
    password: &str,
) -> Result<String, GatewayError> {
    let response = forwarder
        .post_json_anonymous(LOGIN_PATH, &json!({ "email": email, "password": password }))
        .await?;

    match response.status {
        StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
            info!(status = response.status.as_u16(), "upstream rejected login");
            return Err(GatewayError::Unauthenticated(
                "invalid email or password".to_owned(),
            ));
        }
        status if !status.is_success() => {
            warn!(status = status.as_u16(), "upstream login failed");
            return Err(GatewayError::Upstream(format!(
                "upstream login failed with status {status}"
            )));
        }
        _ => {}
    }

    response
        .json()
        .as_ref()
        .and_then(|body| body.get("accessToken"))
        .and_then(serde_json::Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            GatewayError::Upstream("upstream login response has no accessToken".to_owned())
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use darkroom_core::GatewayConfig;

    use super::*;
    use crate::testing::{MockResponse, MockUpstream};

    fn forwarder(base_url: &str) -> ProxyForwarder {
        ProxyForwarder::new(Arc::new(GatewayConfig::new(base_url).with_api_key("service-key")))
            .unwrap()
    }

    #[tokio::test]
    async fn successful_login_returns_access_token() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server
                .respond_once(MockResponse::json(
                    201,
                    r#"{"accessToken":"upstream-bearer","userId":"u1"}"#,
                ))
                .await
        });

        let token = exchange_credentials(&forwarder, "ops@example.com", "hunter2")
            .await
            .unwrap();
        let captured = handle.await.unwrap();

        assert_eq!(token, "upstream-bearer");
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.path, "/auth/login");
        assert!(captured.header("x-api-key").is_none());
        assert!(captured.header("authorization").is_none());
        let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
        assert_eq!(body, json!({"email": "ops@example.com", "password": "hunter2"}));
    }

    #[tokio::test]
    async fn rejected_credentials_are_unauthenticated() {
        for status in [400_u16, 401] {
            let server = MockUpstream::start().await;
            let forwarder = forwarder(&server.base_url);
            let handle = tokio::spawn(async move {
                server
                    .respond_once(MockResponse::json(status, r#"{"message":"Incorrect email or password"}"#))
                    .await
            });

            let err = exchange_credentials(&forwarder, "ops@example.com", "wrong")
                .await
                .unwrap_err();
            handle.await.unwrap();
            assert!(matches!(err, GatewayError::Unauthenticated(_)), "{status}: {err:?}");
        }
    }

    #[tokio::test]
    async fn server_failure_is_upstream_error() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server.respond_once(MockResponse::json(503, "{}")).await
        });

        let err = exchange_credentials(&forwarder, "ops@example.com", "pw")
            .await
            .unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }

    #[tokio::test]
    async fn success_without_token_is_upstream_error() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server.respond_once(MockResponse::json(200, r#"{"userId":"u1"}"#)).await
        });

        let err = exchange_credentials(&forwarder, "ops@example.com", "pw")
            .await
            .unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }
}
