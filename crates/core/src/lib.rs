pub mod claims;
pub mod config;
pub mod identity;

pub use claims::{AssetAccessClaims, SessionClaims, ShareClaims};
pub use config::GatewayConfig;
pub use identity::{CallerIdentity, IdentityKind};
