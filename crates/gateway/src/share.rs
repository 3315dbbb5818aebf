use std::sync::Arc;
use std::time::Duration;

use darkroom_core::{AssetAccessClaims, CallerIdentity, SessionClaims, ShareClaims};
use darkroom_crypto::{TokenCodec, VerifiedToken};
use reqwest::Method;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::GatewayError;
use crate::forwarder::{ProxyBody, ProxyRequest};
use crate::scope::{AssetScope, ClaimsAssetScope};

/// Rendition served by the upstream thumbnail endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSize {
    Preview,
    #[default]
    Thumbnail,
}

impl ThumbnailSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Thumbnail => "thumbnail",
        }
    }
}

/// Gate in front of the share endpoints.
///
/// Every operation verifies the capability token and checks the requested
/// assets against the [`AssetScope`] before handing out the
/// [`CallerIdentity::ShareKey`] identity. Nothing here touches the network,
/// so a rejected request never produces an upstream call.
#[derive(Clone)]
pub struct ShareGate {
    codec: Arc<TokenCodec>,
    scope: Arc<dyn AssetScope>,
}

impl ShareGate {
    pub fn new(codec: Arc<TokenCodec>, scope: Arc<dyn AssetScope>) -> Self {
        Self { codec, scope }
    }

    /// A gate using [`ClaimsAssetScope`].
    pub fn with_claims_scope(codec: Arc<TokenCodec>) -> Self {
        Self::new(codec, Arc::new(ClaimsAssetScope))
    }

    /// Sign a share link over `claims`.
    pub fn issue_link(
        &self,
        claims: &ShareClaims,
        ttl: Option<Duration>,
    ) -> Result<String, GatewayError> {
        if claims.extra.contains_key(SessionClaims::ACCESS_TOKEN_KEY) {
            return Err(GatewayError::Forbidden(
                "share claims may not carry an access token".to_owned(),
            ));
        }
        Ok(self.codec.issue(claims, ttl)?)
    }

    /// Sign a link granting a single asset.
    pub fn issue_asset_link(
        &self,
        asset_id: &str,
        ttl: Option<Duration>,
    ) -> Result<String, GatewayError> {
        validate_asset_id(asset_id)?;
        let claims = AssetAccessClaims {
            asset_id: asset_id.to_owned(),
        };
        Ok(self.codec.issue(&claims, ttl)?)
    }

    /// Verify `token`, keeping its timestamps.
    pub fn inspect(&self, token: Option<&str>) -> Result<VerifiedToken<ShareClaims>, GatewayError> {
        let verified = self.codec.decode(require_token(token)?)?;
        reject_session_payload(&verified.claims)?;
        Ok(verified)
    }

    /// Verify `token` and, when `asset_id` is given, check it is in scope.
    #[instrument(skip_all, fields(asset_id = asset_id.unwrap_or_default()))]
    pub async fn open(
        &self,
        token: Option<&str>,
        asset_id: Option<&str>,
    ) -> Result<(ShareClaims, CallerIdentity), GatewayError> {
        let claims: ShareClaims = self.codec.verify(require_token(token)?)?;
        reject_session_payload(&claims)?;

        if let Some(asset_id) = asset_id {
            validate_asset_id(asset_id)?;
            if !self.scope.permits(&claims, asset_id).await? {
                debug!("asset outside share scope");
                return Err(GatewayError::Forbidden(format!(
                    "asset {asset_id} is not covered by this link"
                )));
            }
        }

        Ok((claims, CallerIdentity::ShareKey))
    }

    /// Upstream request for an asset thumbnail.
    pub async fn thumbnail(
        &self,
        token: Option<&str>,
        asset_id: &str,
        size: ThumbnailSize,
    ) -> Result<(CallerIdentity, ProxyRequest), GatewayError> {
        let (_, identity) = self.open(token, Some(asset_id)).await?;
        let path = format!("/assets/{asset_id}/thumbnail?size={}", size.as_str());
        Ok((identity, ProxyRequest::new(Method::GET, path)))
    }

    /// Upstream request for an asset's original file.
    pub async fn original(
        &self,
        token: Option<&str>,
        asset_id: &str,
    ) -> Result<(CallerIdentity, ProxyRequest), GatewayError> {
        let (_, identity) = self.open(token, Some(asset_id)).await?;
        let path = format!("/assets/{asset_id}/original");
        Ok((identity, ProxyRequest::new(Method::GET, path)))
    }

    /// Upstream archive request covering every asset in the token's scope.
    pub async fn download(
        &self,
        token: Option<&str>,
    ) -> Result<(CallerIdentity, ProxyRequest), GatewayError> {
        let (claims, identity) = self.open(token, None).await?;
        let ids = self.scope.asset_ids(&claims).await?;
        if ids.is_empty() {
            return Err(GatewayError::Forbidden(
                "this link does not resolve to any assets".to_owned(),
            ));
        }
        for id in &ids {
            validate_asset_id(id)?;
        }

        debug!(assets = ids.len(), "share download authorized");
        let body = serde_json::json!({ "assetIds": ids }).to_string();
        let request = ProxyRequest::new(Method::POST, "/download/archive").with_body(
            ProxyBody::Text(body),
            Some(HeaderValue::from_static("application/json")),
        );
        Ok((identity, request))
    }
}

impl std::fmt::Debug for ShareGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareGate")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

fn require_token(token: Option<&str>) -> Result<&str, GatewayError> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Unauthenticated("share token is required".to_owned()))
}

/// Session cookies are signed with the same secret and would otherwise parse
/// as filter-only share claims.
fn reject_session_payload(claims: &ShareClaims) -> Result<(), GatewayError> {
    if claims.extra.contains_key(SessionClaims::ACCESS_TOKEN_KEY) {
        return Err(GatewayError::TokenMalformed(
            "session token presented as a share link".to_owned(),
        ));
    }
    Ok(())
}

/// Asset ids are spliced into upstream paths, so only id characters pass.
fn validate_asset_id(asset_id: &str) -> Result<(), GatewayError> {
    let valid = !asset_id.is_empty()
        && asset_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GatewayError::Forbidden(format!("invalid asset id: {asset_id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn gate() -> ShareGate {
        ShareGate::with_claims_scope(Arc::new(TokenCodec::from_secret("share-secret")))
    }

    #[tokio::test]
    async fn missing_or_blank_token_is_unauthenticated() {
        let gate = gate();
        for token in [None, Some(""), Some("   ")] {
            let err = gate.open(token, Some("a1")).await.unwrap_err();
            assert!(matches!(err, GatewayError::Unauthenticated(_)), "{token:?}");
        }
    }

    #[tokio::test]
    async fn asset_link_opens_only_its_asset() {
        let gate = gate();
        let token = gate.issue_asset_link("asset-1", None).unwrap();

        let (claims, identity) = gate.open(Some(&token), Some("asset-1")).await.unwrap();
        assert_eq!(claims.asset_id.as_deref(), Some("asset-1"));
        assert!(matches!(identity, CallerIdentity::ShareKey));

        let err = gate.open(Some(&token), Some("asset-2")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
    }

    #[tokio::test]
    async fn thumbnail_targets_requested_size() {
        let gate = gate();
        let token = gate.issue_asset_link("a1", None).unwrap();
        let (_, request) = gate
            .thumbnail(Some(&token), "a1", ThumbnailSize::Preview)
            .await
            .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/assets/a1/thumbnail?size=preview");

        let (_, request) = gate.original(Some(&token), "a1").await.unwrap();
        assert_eq!(request.path, "/assets/a1/original");
    }

    #[tokio::test]
    async fn path_like_asset_ids_are_rejected() {
        let gate = gate();
        let token = gate
            .issue_link(&ShareClaims {
                album_ids: vec!["album".into()],
                ..ShareClaims::default()
            }, None)
            .unwrap();
        let err = gate
            .original(Some(&token), "../users/me")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
        assert!(gate.issue_asset_link("a/b", None).is_err());
    }

    #[tokio::test]
    async fn download_posts_scoped_ids() {
        let gate = gate();
        let claims = ShareClaims {
            asset_ids: vec!["a1".into(), "a2".into()],
            ..ShareClaims::default()
        };
        let token = gate.issue_link(&claims, Some(Duration::from_secs(60))).unwrap();

        let (identity, request) = gate.download(Some(&token)).await.unwrap();
        assert!(matches!(identity, CallerIdentity::ShareKey));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/download/archive");
        let ProxyBody::Text(body) = &request.body else {
            panic!("expected a JSON body, got {:?}", request.body);
        };
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, json!({"assetIds": ["a1", "a2"]}));
    }

    #[tokio::test]
    async fn download_without_ids_is_forbidden() {
        let gate = gate();
        let token = gate
            .issue_link(&ShareClaims {
                person_ids: vec!["p1".into()],
                ..ShareClaims::default()
            }, None)
            .unwrap();
        let err = gate.download(Some(&token)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
    }

    #[tokio::test]
    async fn token_from_other_secret_is_malformed() {
        let other = ShareGate::with_claims_scope(Arc::new(TokenCodec::from_secret("other")));
        let token = other.issue_asset_link("a1", None).unwrap();
        let err = gate().open(Some(&token), Some("a1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::TokenMalformed(_)));
    }

    #[tokio::test]
    async fn session_token_is_not_a_share_link() {
        let codec = Arc::new(TokenCodec::from_secret("share-secret"));
        let session = codec
            .issue(
                &SessionClaims {
                    access_token: "operator-bearer".into(),
                },
                None,
            )
            .unwrap();
        let gate = ShareGate::with_claims_scope(codec);

        let err = gate.open(Some(&session), Some("a1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::TokenMalformed(_)));
        assert!(matches!(
            gate.inspect(Some(&session)),
            Err(GatewayError::TokenMalformed(_))
        ));

        let mut smuggled = ShareClaims::default();
        smuggled
            .extra
            .insert("accessToken".into(), serde_json::Value::from("bearer"));
        assert!(matches!(
            gate.issue_link(&smuggled, None),
            Err(GatewayError::Forbidden(_))
        ));
    }

    #[test]
    fn inspect_returns_claims_and_expiry() {
        let gate = gate();
        let claims = ShareClaims {
            album_ids: vec!["a1".into()],
            ..ShareClaims::default()
        };
        let token = gate.issue_link(&claims, Some(Duration::from_secs(3600))).unwrap();
        let verified = gate.inspect(Some(&token)).unwrap();
        assert_eq!(verified.claims, claims);
        assert!(verified.expires_at.is_some());
    }

    #[test]
    fn unsignable_ttl_is_rejected_at_issue() {
        let gate = gate();
        let ttl = Some(Duration::from_secs(10_000_000_000_000));
        assert!(matches!(
            gate.issue_link(&ShareClaims::default(), ttl),
            Err(GatewayError::InvalidTtl(_))
        ));
        assert!(matches!(
            gate.issue_asset_link("a1", ttl),
            Err(GatewayError::InvalidTtl(_))
        ));
    }

    #[test]
    fn thumbnail_size_parses_lowercase() {
        let size: ThumbnailSize = serde_json::from_value(json!("preview")).unwrap();
        assert_eq!(size, ThumbnailSize::Preview);
        assert_eq!(ThumbnailSize::default().as_str(), "thumbnail");
        assert!(serde_json::from_value::<ThumbnailSize>(json!("huge")).is_err());
    }
}
