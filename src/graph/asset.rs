//! Asset representation: a typed, user-meaningful graph node

use serde::{Deserialize, Serialize};

/// The type of an asset (e.g., "host", "ip", "user")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetType(String);

impl AssetType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A node of the knowledge graph.
///
/// Identity is the (type, key) pair. Two assets with the same type and key
/// are the same asset, whichever graph they come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub key: String,
}

impl Asset {
    pub fn new(asset_type: impl Into<AssetType>, key: impl Into<String>) -> Self {
        Self {
            asset_type: asset_type.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.asset_type, self.key)
    }
}

/// An asset together with the opaque ID the store assigned to it.
///
/// Only produced by read operations; the client never chooses IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetWithId {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub asset: Asset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_type_and_key() {
        assert_eq!(Asset::new("host", "a"), Asset::new("host", "a"));
        assert_ne!(Asset::new("host", "a"), Asset::new("ip", "a"));
        assert_ne!(Asset::new("host", "a"), Asset::new("host", "b"));
    }

    #[test]
    fn orders_by_type_then_key() {
        let mut assets = vec![
            Asset::new("ip", "1"),
            Asset::new("host", "b"),
            Asset::new("host", "a"),
        ];
        assets.sort();
        assert_eq!(
            assets,
            vec![
                Asset::new("host", "a"),
                Asset::new("host", "b"),
                Asset::new("ip", "1"),
            ]
        );
    }

    #[test]
    fn serializes_type_field() {
        let json = serde_json::to_value(Asset::new("host", "a")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "host", "key": "a"}));
    }

    #[test]
    fn asset_with_id_flattens_identity() {
        let parsed: AssetWithId =
            serde_json::from_str(r#"{"_id": "42", "type": "host", "key": "a"}"#).unwrap();
        assert_eq!(parsed.id, "42");
        assert_eq!(parsed.asset, Asset::new("host", "a"));
    }
}
