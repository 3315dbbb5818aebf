use std::sync::Arc;

use darkroom_core::{CallerIdentity, GatewayConfig};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::GatewayError;

/// Header carrying API-key credentials to the upstream service.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Turns a [`CallerIdentity`] into the exact header set the upstream service
/// expects.
///
/// Every successful resolution yields `Content-Type: application/json` plus
/// exactly one of `Authorization` or `x-api-key`.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    config: Arc<GatewayConfig>,
}

impl CredentialResolver {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    pub fn resolve(&self, identity: &CallerIdentity) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match identity {
            CallerIdentity::Session { .. } => {
                let token = identity
                    .access_token()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        GatewayError::Unauthenticated("session has no access token".to_owned())
                    })?;
                headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {token}"))?);
            }
            CallerIdentity::ApiKey => {
                let key = self.config.api_key().ok_or_else(|| {
                    GatewayError::Configuration("service API key is not set".to_owned())
                })?;
                headers.insert(API_KEY_HEADER, sensitive(key)?);
            }
            CallerIdentity::ShareKey => {
                let key = self.config.share_api_key().ok_or_else(|| {
                    GatewayError::Configuration("share API key is not set".to_owned())
                })?;
                headers.insert(API_KEY_HEADER, sensitive(key)?);
            }
        }

        debug!(scheme = %identity.kind(), "resolved upstream credentials");
        Ok(headers)
    }
}

fn sensitive(value: &str) -> Result<HeaderValue, GatewayError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        GatewayError::Configuration("credential contains characters not valid in a header".to_owned())
    })?;
    header.set_sensitive(true);
    Ok(header)
}
