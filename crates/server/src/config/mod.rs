mod auth;
mod server;
mod session;
mod telemetry;
mod tokens;
mod upstream;


pub use auth::*;
pub use server::*;
pub use session::*;
pub use telemetry::*;
pub use tokens::*;
pub use upstream::*;

use std::path::Path;
use std::time::Duration;

use darkroom_core::GatewayConfig;
use darkroom_crypto::{ExposeSecret, SecretString, TokenCodec};
use serde::Deserialize;

use crate::error::ServerError;

/// Overrides `upstream.url`.
pub const ENV_UPSTREAM_URL: &str = "DARKROOM_UPSTREAM_URL";
/// Overrides `tokens.signing_secret`.
pub const ENV_SIGNING_SECRET: &str = "DARKROOM_SIGNING_SECRET";
/// Overrides `upstream.api_key`.
pub const ENV_API_KEY: &str = "DARKROOM_API_KEY";
/// Overrides `upstream.share_api_key`.
pub const ENV_SHARE_API_KEY: &str = "DARKROOM_SHARE_API_KEY";
/// Overrides `upstream.device_id`.
pub const ENV_DEVICE_ID: &str = "DARKROOM_DEVICE_ID";

/// Top-level configuration for the Darkroom server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct DarkroomConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream media service location and credentials.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Capability token signing.
    #[serde(default)]
    pub tokens: TokensConfig,
    /// How operator requests are authenticated.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Operator session cookie settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// OpenTelemetry distributed tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl DarkroomConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ServerError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work at runtime.
    fn validate(&self) -> Result<(), ServerError> {
        if self.session.ttl_seconds == 0 {
            return Err(ServerError::Config(
                "session.ttl_seconds must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Load `path`, or fall back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Apply `DARKROOM_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply `DARKROOM_*` overrides from `lookup`. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var(ENV_UPSTREAM_URL) {
            self.upstream.url = url;
        }
        if let Some(secret) = var(ENV_SIGNING_SECRET) {
            self.tokens.signing_secret = Some(SecretString::new(secret));
        }
        if let Some(key) = var(ENV_API_KEY) {
            self.upstream.api_key = Some(SecretString::new(key));
        }
        if let Some(key) = var(ENV_SHARE_API_KEY) {
            self.upstream.share_api_key = Some(SecretString::new(key));
        }
        if let Some(device_id) = var(ENV_DEVICE_ID) {
            self.upstream.device_id = device_id;
        }
    }

    /// The gateway's view of the upstream settings. Blank keys count as unset.
    pub fn gateway_config(&self) -> GatewayConfig {
        let upstream = &self.upstream;
        let mut config = GatewayConfig::new(upstream.url.clone())
            .with_device_id(upstream.device_id.clone())
            .with_timeout(Duration::from_secs(upstream.timeout_seconds));
        if let Some(key) = &upstream.api_key {
            config = config.with_api_key(key.expose_secret());
        }
        if let Some(key) = &upstream.share_api_key {
            config = config.with_share_api_key(key.expose_secret());
        }
        config
    }

    /// Codec over the configured signing secret. Missing secrets are reported
    /// per operation, not here.
    pub fn token_codec(&self) -> TokenCodec {
        TokenCodec::new(self.tokens.signing_secret.as_ref())
    }
}
