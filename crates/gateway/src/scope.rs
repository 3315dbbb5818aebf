use async_trait::async_trait;
use darkroom_core::ShareClaims;

use crate::error::GatewayError;

/// Decides what a verified share claim set may reach.
///
/// The default [`ClaimsAssetScope`] only looks at the claims themselves. A
/// deployment that can enumerate album or person membership can inject its
/// own implementation into the [`ShareGate`](crate::ShareGate).
#[async_trait]
pub trait AssetScope: Send + Sync {
    /// Whether `claims` grant access to `asset_id`.
    async fn permits(&self, claims: &ShareClaims, asset_id: &str) -> Result<bool, GatewayError>;

    /// The asset ids an archive download under `claims` covers.
    async fn asset_ids(&self, claims: &ShareClaims) -> Result<Vec<String>, GatewayError>;
}

/// Scope derived from the claims alone.
///
/// Claims naming concrete assets (`assetId` or `assetIds`) are limited to
/// exactly those assets. Filter-only claims are permitted for single-asset
/// reads, leaving the share API key to bound what the upstream will serve,
/// but resolve to no ids for downloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsAssetScope;

#[async_trait]
impl AssetScope for ClaimsAssetScope {
    async fn permits(&self, claims: &ShareClaims, asset_id: &str) -> Result<bool, GatewayError> {
        if claims.is_asset_list() {
            return Ok(claims.explicit_asset_ids().iter().any(|id| id == asset_id));
        }
        Ok(true)
    }

    async fn asset_ids(&self, claims: &ShareClaims) -> Result<Vec<String>, GatewayError> {
        Ok(claims.explicit_asset_ids())
    }
}
