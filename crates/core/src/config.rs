use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Default upstream request timeout.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Default device identifier attached to synthesized upload metadata.
pub const DEFAULT_DEVICE_ID: &str = "darkroom";

/// Immutable gateway configuration, built once at startup and shared by
/// reference with every component that talks to the upstream service.
///
/// A missing API key fails only the operations that need it, with a
/// configuration error.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Base URL of the upstream media API (e.g. `http://immich:2283/api`).
    pub upstream_url: String,

    /// Service API key used for [`CallerIdentity::ApiKey`](crate::CallerIdentity::ApiKey).
    pub api_key: Option<SecretString>,

    /// Share-scoped API key used for [`CallerIdentity::ShareKey`](crate::CallerIdentity::ShareKey).
    pub share_api_key: Option<SecretString>,

    /// Device identifier reported to the upstream when creating assets.
    pub device_id: String,

    /// Timeout applied to every upstream call.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a configuration targeting the given upstream base URL.
    ///
    /// Defaults to no API keys, the `darkroom` device id and a 60-second
    /// upstream timeout.
    pub fn new(upstream_url: impl Into<String>) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            api_key: None,
            share_api_key: None,
            device_id: DEFAULT_DEVICE_ID.to_owned(),
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = non_empty_secret(key.into());
        self
    }

    #[must_use]
    pub fn with_share_api_key(mut self, key: impl Into<String>) -> Self {
        self.share_api_key = non_empty_secret(key.into());
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Join the upstream base with a caller-supplied path suffix.
    ///
    /// The suffix is appended verbatim (query string included); only the
    /// separating slash is normalized.
    pub fn upstream_target(&self, suffix: &str) -> String {
        let base = self.upstream_url.trim_end_matches('/');
        if suffix.is_empty() {
            base.to_owned()
        } else if suffix.starts_with('/') {
            format!("{base}{suffix}")
        } else {
            format!("{base}/{suffix}")
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    pub fn share_api_key(&self) -> Option<&str> {
        self.share_api_key.as_ref().map(|k| k.expose_secret().as_str())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<SecretString>| if k.is_some() { "[REDACTED]" } else { "<unset>" };
        f.debug_struct("GatewayConfig")
            .field("upstream_url", &self.upstream_url)
            .field("api_key", &redact(&self.api_key))
            .field("share_api_key", &redact(&self.share_api_key))
            .field("device_id", &self.device_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_empty_secret(raw: String) -> Option<SecretString> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(SecretString::new(raw))
    }
}
