use darkroom_crypto::SecretString;
use serde::Deserialize;

/// Capability token signing.
#[derive(Debug, Default, Deserialize)]
pub struct TokensConfig {
    /// HMAC secret shared by share links, asset links and session cookies.
    ///
    /// Prefer `DARKROOM_SIGNING_SECRET` over writing it to the file. When
    /// unset the server still starts, and every token operation fails with a
    /// configuration error.
    #[serde(default)]
    pub signing_secret: Option<SecretString>,
}
