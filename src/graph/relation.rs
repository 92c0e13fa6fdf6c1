//! Relation representation: a directed, typed edge between two assets

use super::asset::{Asset, AssetType};
use serde::{Deserialize, Serialize};

/// The label of a relation (e.g., "connects", "owns")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationKeyType(String);

impl RelationKeyType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelationKeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelationKeyType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RelationKeyType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Schema-level description of an edge kind: which asset types it connects
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationType {
    pub from_type: AssetType,
    #[serde(rename = "type")]
    pub relation_type: RelationKeyType,
    pub to_type: AssetType,
}

impl RelationType {
    pub fn new(
        from_type: impl Into<AssetType>,
        relation_type: impl Into<RelationKeyType>,
        to_type: impl Into<AssetType>,
    ) -> Self {
        Self {
            from_type: from_type.into(),
            relation_type: relation_type.into(),
            to_type: to_type.into(),
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})-[{}]->({})", self.from_type, self.relation_type, self.to_type)
    }
}

/// A directed, typed edge.
///
/// Identity is (from, to, type). Endpoints are referenced by asset identity
/// because store IDs are unknown to the client until it reads them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub from: Asset,
    pub to: Asset,
    #[serde(rename = "type")]
    pub relation_type: RelationKeyType,
}

impl Relation {
    pub fn new(from: Asset, relation_type: impl Into<RelationKeyType>, to: Asset) -> Self {
        Self {
            from,
            to,
            relation_type: relation_type.into(),
        }
    }

    /// The schema entry this relation is an instance of
    pub fn schema_type(&self) -> RelationType {
        RelationType {
            from_type: self.from.asset_type.clone(),
            relation_type: self.relation_type.clone(),
            to_type: self.to.asset_type.clone(),
        }
    }

    /// True if either endpoint is the given asset
    pub fn touches(&self, asset: &Asset) -> bool {
        &self.from == asset || &self.to == asset
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.relation_type, self.to)
    }
}

/// A relation as returned by the read API: endpoints are store IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationWithId {
    #[serde(rename = "_id")]
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationKeyType,
}
