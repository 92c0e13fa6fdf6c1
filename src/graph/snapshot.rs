//! Graph: the full node/edge/schema state of a knowledge graph

use super::asset::{Asset, AssetWithId};
use super::delta::GraphDelta;
use super::relation::{Relation, RelationWithId};
use super::schema::SchemaGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised while building a graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("relation {0} references an asset that is not in the graph")]
    DanglingRelation(Relation),

    #[error("relation {relation_id} references unknown asset id {asset_id}")]
    UnknownAssetId {
        relation_id: String,
        asset_id: String,
    },
}

/// An in-memory knowledge graph.
///
/// Assets and relations are unique by identity. Every element carries a
/// transient `touched` mark that is set when the element is inserted and
/// cleared by [`Graph::clean`]; marks never take part in equality or diffing.
///
/// The schema always declares every type used by the graph's contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct Graph {
    assets: BTreeMap<Asset, bool>,
    relations: BTreeMap<Relation, bool>,
    schema: SchemaGraph,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from the read API's ID-carrying elements.
    ///
    /// Relation endpoints are resolved from store IDs back to asset identities.
    /// The schema is derived from the contents.
    pub fn from_read(
        assets: Vec<AssetWithId>,
        relations: Vec<RelationWithId>,
    ) -> Result<Self, GraphError> {
        let mut graph = Graph::new();
        let mut by_id: HashMap<String, Asset> = HashMap::with_capacity(assets.len());
        for item in assets {
            graph.insert_asset(item.asset.clone());
            by_id.insert(item.id, item.asset);
        }

        for item in relations {
            let resolve = |asset_id: &str| {
                by_id.get(asset_id).cloned().ok_or_else(|| GraphError::UnknownAssetId {
                    relation_id: item.id.clone(),
                    asset_id: asset_id.to_string(),
                })
            };
            let from = resolve(&item.from_id)?;
            let to = resolve(&item.to_id)?;
            graph.insert_relation(Relation::new(from, item.relation_type.clone(), to))?;
        }

        Ok(graph)
    }

    /// Insert an asset and mark it touched. Returns true if it was new.
    pub fn insert_asset(&mut self, asset: Asset) -> bool {
        self.schema.add_asset_type(asset.asset_type.clone());
        self.assets.insert(asset, true).is_none()
    }

    /// Insert a relation and mark it touched. Returns true if it was new.
    ///
    /// Both endpoints must already be assets of this graph.
    pub fn insert_relation(&mut self, relation: Relation) -> Result<bool, GraphError> {
        if !self.assets.contains_key(&relation.from) || !self.assets.contains_key(&relation.to) {
            return Err(GraphError::DanglingRelation(relation));
        }
        self.schema.add_relation_type(relation.schema_type());
        Ok(self.relations.insert(relation, true).is_none())
    }

    /// Remove an asset and every relation touching it
    pub fn remove_asset(&mut self, asset: &Asset) -> bool {
        if self.assets.remove(asset).is_none() {
            return false;
        }
        self.relations.retain(|relation, _| !relation.touches(asset));
        true
    }

    pub fn remove_relation(&mut self, relation: &Relation) -> bool {
        self.relations.remove(relation).is_some()
    }

    pub fn contains_asset(&self, asset: &Asset) -> bool {
        self.assets.contains_key(asset)
    }

    pub fn contains_relation(&self, relation: &Relation) -> bool {
        self.relations.contains_key(relation)
    }

    /// Assets in identity order
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.keys()
    }

    /// Relations in identity order
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.keys()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.relations.is_empty()
    }

    pub fn schema(&self) -> &SchemaGraph {
        &self.schema
    }

    /// Mutable access to the schema, for declaring types ahead of use.
    pub fn schema_mut(&mut self) -> &mut SchemaGraph {
        &mut self.schema
    }

    /// Mark an existing asset as touched. Returns false if it is absent.
    pub fn touch_asset(&mut self, asset: &Asset) -> bool {
        match self.assets.get_mut(asset) {
            Some(mark) => {
                *mark = true;
                true
            }
            None => false,
        }
    }

    pub fn is_touched(&self, asset: &Asset) -> bool {
        self.assets.get(asset).copied().unwrap_or(false)
    }

    /// Number of assets and relations touched since the last clean
    pub fn touched_count(&self) -> usize {
        self.assets.values().filter(|m| **m).count()
            + self.relations.values().filter(|m| **m).count()
    }

    /// Clear every transient mark. Membership is unchanged.
    pub fn clean(&mut self) {
        self.assets.values_mut().for_each(|m| *m = false);
        self.relations.values_mut().for_each(|m| *m = false);
    }

    /// Drop every element not touched since the last clean.
    ///
    /// Removing an untouched asset also drops its relations.
    pub fn retain_touched(&mut self) {
        let stale: Vec<Asset> = self
            .assets
            .iter()
            .filter(|(_, touched)| !**touched)
            .map(|(asset, _)| asset.clone())
            .collect();
        for asset in &stale {
            self.remove_asset(asset);
        }
        self.relations.retain(|_, touched| *touched);
    }

    /// Compute the delta that turns `baseline` into this graph
    pub fn diff(&self, baseline: &Graph) -> GraphDelta {
        GraphDelta::between(self, baseline)
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
            && self.assets.keys().eq(other.assets.keys())
            && self.relations.keys().eq(other.relations.keys())
    }
}

impl Eq for Graph {}

/// Flat serialized form of a graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphDocument {
    #[serde(default)]
    assets: Vec<Asset>,
    #[serde(default)]
    relations: Vec<Relation>,
    #[serde(default)]
    schema: SchemaGraph,
}

impl TryFrom<GraphDocument> for Graph {
    type Error = GraphError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        let mut graph = Graph::new();
        graph.schema = doc.schema;
        for asset in doc.assets {
            graph.insert_asset(asset);
        }
        for relation in doc.relations {
            graph.insert_relation(relation)?;
        }
        Ok(graph)
    }
}

impl From<Graph> for GraphDocument {
    fn from(graph: Graph) -> Self {
        GraphDocument {
            assets: graph.assets.into_keys().collect(),
            relations: graph.relations.into_keys().collect(),
            schema: graph.schema,
        }
    }
}
