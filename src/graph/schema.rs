//! Graph schema: the set of legal asset and relation types

use super::asset::AssetType;
use super::relation::RelationType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Declares the asset and relation types a graph may contain.
///
/// Pushed wholesale to the store, never diffed element by element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaGraph {
    #[serde(default)]
    pub asset_types: BTreeSet<AssetType>,
    #[serde(default)]
    pub relation_types: BTreeSet<RelationType>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset_type(&mut self, asset_type: AssetType) -> bool {
        self.asset_types.insert(asset_type)
    }

    /// Add a relation type; both endpoint types are declared too
    pub fn add_relation_type(&mut self, relation_type: RelationType) -> bool {
        self.asset_types.insert(relation_type.from_type.clone());
        self.asset_types.insert(relation_type.to_type.clone());
        self.relation_types.insert(relation_type)
    }

    pub fn has_asset_type(&self, asset_type: &AssetType) -> bool {
        self.asset_types.contains(asset_type)
    }

    pub fn has_relation_type(&self, relation_type: &RelationType) -> bool {
        self.relation_types.contains(relation_type)
    }

    pub fn is_empty(&self) -> bool {
        self.asset_types.is_empty() && self.relation_types.is_empty()
    }

    /// Every type declared by either schema
    pub fn union(&self, other: &SchemaGraph) -> SchemaGraph {
        SchemaGraph {
            asset_types: self.asset_types.union(&other.asset_types).cloned().collect(),
            relation_types: self
                .relation_types
                .union(&other.relation_types)
                .cloned()
                .collect(),
        }
    }
}
