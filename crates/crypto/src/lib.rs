//! Capability tokens for the Darkroom gateway.
//!
//! A capability token is a compact HS256 JWT whose payload wraps an arbitrary
//! JSON claim set together with its issuance time and an optional expiry:
//!
//! ```text
//! {"iat": 1700000000, "exp": 1700003600, "claims": { ... }}
//! ```
//!
//! Verification is stateless: any process holding the signing secret can
//! check a token, and expiry is the only lifecycle control.

mod token;

// Re-export for consumers so they don't need a direct `secrecy` dependency.
pub use secrecy::{ExposeSecret, SecretString};
pub use token::{TokenCodec, TokenError, VerifiedToken};
