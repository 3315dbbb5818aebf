use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors returned by [`TokenCodec`].
#[derive(Debug, Error)]
pub enum TokenError {
    /// The signing secret is not configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The token carried an expiry and the current time is at or past it.
    #[error("token expired")]
    Expired,

    /// Bad signature, bad encoding, or claims of the wrong shape.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The requested ttl is zero or puts the expiry past the representable
    /// time range.
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
}

/// Signed payload layout. Caller claims are nested so that keys named `iat`
/// or `exp` inside them never collide with the envelope.
#[derive(Serialize)]
struct Envelope<'a, C> {
    iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    claims: &'a C,
}

#[derive(Deserialize)]
struct OwnedEnvelope<C> {
    iat: i64,
    #[serde(default)]
    exp: Option<i64>,
    claims: C,
}

/// A successfully verified token.
#[derive(Debug, Clone)]
pub struct VerifiedToken<C> {
    pub claims: C,
    pub issued_at: DateTime<Utc>,
    /// `None` for tokens issued without a ttl.
    pub expires_at: Option<DateTime<Utc>>,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and verifies capability tokens with a single symmetric secret.
///
/// The same codec backs share links, single-asset links and operator session
/// cookies. A codec built without a secret is still constructible so that the
/// server can start; every operation on it fails with
/// [`TokenError::Configuration`].
pub struct TokenCodec {
    keys: Option<Keys>,
}

impl TokenCodec {
    /// Build a codec from an optional secret. Blank secrets count as unset.
    pub fn new(secret: Option<&SecretString>) -> Self {
        let keys = secret
            .map(|s| s.expose_secret().as_str())
            .filter(|secret| !secret.trim().is_empty())
            .map(str::as_bytes)
            .map(|bytes| Keys {
                encoding: EncodingKey::from_secret(bytes),
                decoding: DecodingKey::from_secret(bytes),
            });
        Self { keys }
    }

    pub fn from_secret(secret: &str) -> Self {
        Self::new(Some(&SecretString::new(secret.to_owned())))
    }

    /// A codec with no secret.
    pub fn unconfigured() -> Self {
        Self { keys: None }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    fn keys(&self) -> Result<&Keys, TokenError> {
        self.keys
            .as_ref()
            .ok_or_else(|| TokenError::Configuration("token signing secret is not set".to_owned()))
    }

    /// Sign `claims`, expiring after `ttl` when one is given.
    pub fn issue<C: Serialize>(&self, claims: &C, ttl: Option<Duration>) -> Result<String, TokenError> {
        self.issue_at(claims, ttl, Utc::now())
    }

    /// Sign `claims` as if issued at `now`.
    ///
    /// Sub-second ttls round up to the next whole second.
    pub fn issue_at<C: Serialize>(
        &self,
        claims: &C,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let keys = self.keys()?;
        let exp = ttl.map(|ttl| expiry(now, ttl)).transpose()?;

        let envelope = Envelope {
            iat: now.timestamp(),
            exp,
            claims,
        };
        encode(&Header::new(Algorithm::HS256), &envelope, &keys.encoding)
            .map_err(|e| TokenError::Malformed(format!("failed to encode claims: {e}")))
    }

    /// Verify `token` and return its claims.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify `token` against the clock reading `now`.
    pub fn verify_at<C: DeserializeOwned>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<C, TokenError> {
        self.decode_at(token, now).map(|verified| verified.claims)
    }

    /// Verify `token` against the current time, keeping issue and expiry
    /// timestamps.
    pub fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<VerifiedToken<C>, TokenError> {
        self.decode_at(token, Utc::now())
    }

    /// Verify `token` against the clock reading `now`, keeping issue and
    /// expiry timestamps.
    pub fn decode_at<C: DeserializeOwned>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken<C>, TokenError> {
        let keys = self.keys()?;

        // Expiry is checked below against the injected clock, with no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        let data = decode::<OwnedEnvelope<C>>(token, &keys.decoding, &validation).map_err(|e| {
            debug!(error = %e, "capability token rejected");
            TokenError::Malformed(e.to_string())
        })?;
        let envelope = data.claims;

        if let Some(exp) = envelope.exp
            && now.timestamp() >= exp
        {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedToken {
            claims: envelope.claims,
            issued_at: timestamp(envelope.iat)?,
            expires_at: envelope.exp.map(timestamp).transpose()?,
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// `now + ttl` in whole seconds, if the result is a representable time.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, TokenError> {
    if ttl.is_zero() {
        return Err(TokenError::InvalidTtl("ttl must be positive".to_owned()));
    }
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .map(|exp| exp.timestamp())
        .ok_or_else(|| TokenError::InvalidTtl(format!("{secs}s is past the supported range")))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| TokenError::Malformed(format!("timestamp out of range: {secs}")))
}
