use darkroom_core::config::{DEFAULT_DEVICE_ID, DEFAULT_UPSTREAM_TIMEOUT};
use darkroom_crypto::SecretString;
use serde::Deserialize;

/// Upstream media service location and credentials.
///
/// # Example
///
/// ```toml
/// [upstream]
/// url = "http://immich:2283/api"
/// api_key = "..."
/// share_api_key = "..."
/// device_id = "darkroom"
/// timeout_seconds = 60
/// ```
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every proxied path is appended to.
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Service API key, used for uploads and `api_key` auth mode.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Lower-privilege key used for token-gated share endpoints.
    #[serde(default)]
    pub share_api_key: Option<SecretString>,
    /// Device id reported when creating assets.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Timeout applied to every upstream call.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            api_key: None,
            share_api_key: None,
            device_id: default_device_id(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:2283/api".to_owned()
}

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_owned()
}

fn default_timeout() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT.as_secs()
}
