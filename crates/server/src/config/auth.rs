use serde::Deserialize;

/// How operator identity is established at the operator entry points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// A signed session cookie minted by `POST /api/auth/login`.
    #[default]
    Session,
    /// Every operator request acts with the service API key. For
    /// single-operator deployments behind their own access control.
    ApiKey,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::ApiKey => "api_key",
        }
    }
}

/// Operator authentication configuration.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
}
