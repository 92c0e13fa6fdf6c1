//! GraphBinder: the surface importers use to populate a desired graph

use super::asset::{Asset, AssetType};
use super::relation::{Relation, RelationType};
use super::snapshot::{Graph, GraphError};

/// Declares the assets and relations present in the desired state.
///
/// Binding an element records its type in the schema and marks it touched.
pub struct GraphBinder<'a> {
    graph: &'a mut Graph,
}

impl<'a> GraphBinder<'a> {
    pub fn new(graph: &'a mut Graph) -> Self {
        Self { graph }
    }

    /// Declare an asset type even if no asset of that type is bound
    pub fn declare_asset_type(&mut self, asset_type: impl Into<AssetType>) {
        self.graph.schema_mut().add_asset_type(asset_type.into());
    }

    /// Declare a relation type even if no relation of that type is bound
    pub fn declare_relation_type(&mut self, relation_type: RelationType) {
        self.graph.schema_mut().add_relation_type(relation_type);
    }

    /// Bind an asset, returning its identity
    pub fn bind(&mut self, key: impl Into<String>, asset_type: impl Into<AssetType>) -> Asset {
        let asset = Asset::new(asset_type, key);
        if !self.graph.insert_asset(asset.clone()) {
            self.graph.touch_asset(&asset);
        }
        asset
    }

    /// Bind a relation between two assets, binding the endpoints as needed.
    pub fn relate(
        &mut self,
        from_key: impl Into<String>,
        relation_type: &RelationType,
        to_key: impl Into<String>,
    ) -> Result<Relation, GraphError> {
        let from = self.bind(from_key, relation_type.from_type.clone());
        let to = self.bind(to_key, relation_type.to_type.clone());
        let relation = Relation::new(from, relation_type.relation_type.clone(), to);
        self.graph.insert_relation(relation.clone())?;
        Ok(relation)
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }
}
