use std::time::Duration;

use serde::Deserialize;

/// Operator session cookie settings.
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a session token and its cookie.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Add the `Secure` attribute to the cookie. Enable behind HTTPS.
    #[serde(default)]
    pub secure_cookie: bool,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            secure_cookie: false,
        }
    }
}

fn default_ttl() -> u64 {
    12 * 60 * 60
}
