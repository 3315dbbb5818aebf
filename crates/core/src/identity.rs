use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// The credential scheme a request uses when it reaches the upstream media
/// service.
///
/// The variant is chosen by the entry point that served the request, never by
/// inspecting client-supplied headers, so at most one authorization header can
/// ever be produced for a request.
#[derive(Clone)]
pub enum CallerIdentity {
    /// An operator acting with their own upstream bearer token.
    Session {
        /// Upstream access token recovered from the signed session cookie.
        access_token: SecretString,
    },
    /// The gateway acting with the process-wide service API key.
    ApiKey,
    /// An anonymous caller admitted by a verified capability token, acting
    /// with the lower-privilege share API key.
    ShareKey,
}

/// Discriminant of a [`CallerIdentity`], safe to log and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Session,
    ApiKey,
    ShareKey,
}

impl CallerIdentity {
    /// Build a session identity from a raw upstream access token.
    pub fn session(access_token: impl Into<String>) -> Self {
        Self::Session {
            access_token: SecretString::new(access_token.into()),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        match self {
            Self::Session { .. } => IdentityKind::Session,
            Self::ApiKey => IdentityKind::ApiKey,
            Self::ShareKey => IdentityKind::ShareKey,
        }
    }

    /// Returns the session bearer token, if this is a session identity.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Session { access_token } => Some(access_token.expose_secret().as_str()),
            Self::ApiKey | Self::ShareKey => None,
        }
    }
}

impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session { .. } => f
                .debug_struct("Session")
                .field("access_token", &"[REDACTED]")
                .finish(),
            Self::ApiKey => f.write_str("ApiKey"),
            Self::ShareKey => f.write_str("ShareKey"),
        }
    }
}

impl IdentityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::ApiKey => "api_key",
            Self::ShareKey => "share_key",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_access_token() {
        let identity = CallerIdentity::session("very-secret-token");
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("very-secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(CallerIdentity::session("t").kind(), IdentityKind::Session);
        assert_eq!(CallerIdentity::ApiKey.kind(), IdentityKind::ApiKey);
        assert_eq!(CallerIdentity::ShareKey.kind(), IdentityKind::ShareKey);
    }

    #[test]
    fn access_token_only_for_sessions() {
        assert_eq!(CallerIdentity::session("abc").access_token(), Some("abc"));
        assert_eq!(CallerIdentity::ApiKey.access_token(), None);
        assert_eq!(CallerIdentity::ShareKey.access_token(), None);
    }

    #[test]
    fn kind_display() {
        assert_eq!(IdentityKind::ShareKey.to_string(), "share_key");
    }
}
