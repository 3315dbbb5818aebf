//! Claim shapes carried inside capability tokens.
//!
//! All shapes go through the same codec and signing secret; they differ only in
//! what the bearer is allowed to reach.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Filter criteria behind a share link.
///
/// Unknown keys are preserved in [`extra`](Self::extra) so a claim set survives
/// a decode/re-encode unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareClaims {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub album_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub person_ids: Vec<String>,

    /// Explicit asset allow-list. When non-empty it is the whole scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    /// Single-asset grant, present when the token came from an asset link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ShareClaims {
    /// `true` if the claims name concrete assets rather than filters.
    pub fn is_asset_list(&self) -> bool {
        self.asset_id.is_some() || !self.asset_ids.is_empty()
    }

    /// Asset ids named explicitly by the claims, single grant first.
    pub fn explicit_asset_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.asset_ids.len() + 1);
        if let Some(id) = &self.asset_id {
            ids.push(id.clone());
        }
        for id in &self.asset_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Grant for a single asset's thumbnail and original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAccessClaims {
    pub asset_id: String,
}

/// Payload of the operator session cookie.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub access_token: String,
}

impl SessionClaims {
    /// Wire name of [`access_token`](Self::access_token).
    pub const ACCESS_TOKEN_KEY: &'static str = "accessToken";
}

impl std::fmt::Debug for SessionClaims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClaims")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_claims_use_camel_case_keys() {
        let claims = ShareClaims {
            album_ids: vec!["a1".into()],
            start_date: Some("2024-01-01".into()),
            ..ShareClaims::default()
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"albumIds": ["a1"], "startDate": "2024-01-01"})
        );
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let raw = serde_json::json!({"personIds": ["p1"], "sort": "desc"});
        let claims: ShareClaims = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(claims.person_ids, vec!["p1"]);
        assert_eq!(claims.extra.get("sort"), Some(&Value::from("desc")));
        assert_eq!(serde_json::to_value(&claims).unwrap(), raw);
    }

    #[test]
    fn asset_access_claims_parse_as_share_claims() {
        let token_claims = serde_json::to_value(AssetAccessClaims {
            asset_id: "x".into(),
        })
        .unwrap();
        let claims: ShareClaims = serde_json::from_value(token_claims).unwrap();
        assert!(claims.is_asset_list());
        assert_eq!(claims.explicit_asset_ids(), vec!["x"]);
    }

    #[test]
    fn explicit_ids_are_deduplicated() {
        let claims = ShareClaims {
            asset_id: Some("a".into()),
            asset_ids: vec!["a".into(), "b".into()],
            ..ShareClaims::default()
        };
        assert_eq!(claims.explicit_asset_ids(), vec!["a", "b"]);
    }

    #[test]
    fn filter_only_claims_are_not_an_asset_list() {
        let claims = ShareClaims {
            album_ids: vec!["a1".into()],
            ..ShareClaims::default()
        };
        assert!(!claims.is_asset_list());
    }

    #[test]
    fn session_claims_key_matches_wire_name() {
        let json = serde_json::to_value(SessionClaims {
            access_token: "t".into(),
        })
        .unwrap();
        assert!(json.get(SessionClaims::ACCESS_TOKEN_KEY).is_some());
    }

    #[test]
    fn session_claims_debug_is_redacted() {
        let claims = SessionClaims {
            access_token: "bearer-value".into(),
        };
        assert!(!format!("{claims:?}").contains("bearer-value"));
    }
}
