pub mod credentials;
pub mod error;
pub mod forwarder;
pub mod scope;
pub mod session;
pub mod share;
pub mod upload;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use credentials::CredentialResolver;
pub use error::GatewayError;
pub use forwarder::{ProxyBody, ProxyForwarder, ProxyRequest, ProxyResponse, RelayBody, RelayKind};
pub use scope::{AssetScope, ClaimsAssetScope};
pub use session::exchange_credentials;
pub use share::{ShareGate, ThumbnailSize};
pub use upload::{UploadHints, UploadIngest, UploadIngestor, UploadItem, UploadMetadata};
