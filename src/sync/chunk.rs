//! Commit phases and chunking of delta sets

use crate::graph::{Asset, GraphDelta, Relation, SchemaGraph};
use crate::store::{RemoteStore, StoreOp, StoreResult};

/// One ordering step of a commit.
///
/// Phases run one after another; chunks within a phase run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Merged schema, so every type used or removed below exists
    SchemaStaging,
    AssetAdd,
    RelationAdd,
    RelationRemove,
    AssetRemove,
    /// Desired schema, once obsolete elements are gone
    SchemaTarget,
}

impl Phase {
    pub fn op(&self) -> StoreOp {
        match self {
            Self::SchemaStaging | Self::SchemaTarget => StoreOp::PutSchema,
            Self::AssetAdd => StoreOp::PutAssets,
            Self::RelationAdd => StoreOp::PutRelations,
            Self::RelationRemove => StoreOp::DeleteRelations,
            Self::AssetRemove => StoreOp::DeleteAssets,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SchemaStaging => "schema-staging",
            Self::AssetAdd => "asset-add",
            Self::RelationAdd => "relation-add",
            Self::RelationRemove => "relation-remove",
            Self::AssetRemove => "asset-remove",
            Self::SchemaTarget => "schema-target",
        };
        write!(f, "{}", name)
    }
}

/// What a chunk carries to the store
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Schema(SchemaGraph),
    Assets(Vec<Asset>),
    Relations(Vec<Relation>),
}

/// A bounded batch pushed in exactly one store call
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub phase: Phase,
    pub index: usize,
    pub payload: Payload,
}

impl Chunk {
    /// Number of elements carried (a schema counts as one)
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Schema(_) => 1,
            Payload::Assets(assets) => assets.len(),
            Payload::Relations(relations) => relations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issue the store call for this chunk
    pub async fn push(&self, store: &dyn RemoteStore) -> StoreResult<()> {
        match (&self.payload, self.phase.op()) {
            (Payload::Schema(schema), _) => store.put_schema(schema).await,
            (Payload::Assets(assets), StoreOp::DeleteAssets) => store.delete_assets(assets).await,
            (Payload::Assets(assets), _) => store.put_assets(assets).await,
            (Payload::Relations(relations), StoreOp::DeleteRelations) => {
                store.delete_relations(relations).await
            }
            (Payload::Relations(relations), _) => store.put_relations(relations).await,
        }
    }
}

/// Split `items` into consecutive batches of at most `size` elements
pub fn partition<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

fn chunks_of<T: Clone>(phase: Phase, items: &[T], size: usize, wrap: fn(Vec<T>) -> Payload) -> Vec<Chunk> {
    partition(items, size)
        .into_iter()
        .enumerate()
        .map(|(index, batch)| Chunk { phase, index, payload: wrap(batch) })
        .collect()
}

/// Lay a delta out as ordered phases of chunks. Empty phases are omitted.
///
/// Adds run before removes; asset adds precede relation adds and relation
/// removes precede asset removes.
pub fn plan(delta: &GraphDelta, chunk_size: usize) -> Vec<(Phase, Vec<Chunk>)> {
    let schema_chunk = |phase, schema: &SchemaGraph| {
        vec![Chunk { phase, index: 0, payload: Payload::Schema(schema.clone()) }]
    };

    let mut phases = Vec::new();
    if let Some(change) = &delta.schema {
        phases.push((Phase::SchemaStaging, schema_chunk(Phase::SchemaStaging, &change.staging)));
    }
    phases.push((
        Phase::AssetAdd,
        chunks_of(Phase::AssetAdd, &delta.assets_to_add, chunk_size, Payload::Assets),
    ));
    phases.push((
        Phase::RelationAdd,
        chunks_of(Phase::RelationAdd, &delta.relations_to_add, chunk_size, Payload::Relations),
    ));
    phases.push((
        Phase::RelationRemove,
        chunks_of(Phase::RelationRemove, &delta.relations_to_remove, chunk_size, Payload::Relations),
    ));
    phases.push((
        Phase::AssetRemove,
        chunks_of(Phase::AssetRemove, &delta.assets_to_remove, chunk_size, Payload::Assets),
    ));
    if let Some(change) = delta.schema.as_ref().filter(|c| c.needs_target_push()) {
        phases.push((Phase::SchemaTarget, schema_chunk(Phase::SchemaTarget, &change.target)));
    }

    phases.retain(|(_, chunks)| !chunks.is_empty());
    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use std::collections::HashSet;

    fn host(key: &str) -> Asset {
        Asset::new("host", key)
    }

    #[test]
    fn partition_covers_every_element_once() {
        for n in 0..40usize {
            for size in 1..12usize {
                let items: Vec<usize> = (0..n).collect();
                let chunks = partition(&items, size);

                assert_eq!(chunks.len(), n.div_ceil(size), "n={} size={}", n, size);
                assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));

                let flattened: Vec<usize> = chunks.into_iter().flatten().collect();
                assert_eq!(flattened, items);
            }
        }
    }

    #[test]
    fn partition_treats_zero_size_as_one() {
        assert_eq!(partition(&[1, 2, 3], 0).len(), 3);
    }

    #[test]
    fn plan_orders_phases() {
        let mut baseline = Graph::new();
        baseline.insert_asset(host("a"));
        baseline.insert_asset(host("old"));
        baseline
            .insert_relation(Relation::new(host("a"), "connects", host("old")))
            .unwrap();

        let mut desired = Graph::new();
        desired.insert_asset(host("a"));
        desired.insert_asset(host("b"));
        desired
            .insert_relation(Relation::new(host("a"), "connects", host("b")))
            .unwrap();

        let phases: Vec<Phase> = plan(&desired.diff(&baseline), 10)
            .into_iter()
            .map(|(phase, _)| phase)
            .collect();
        assert_eq!(
            phases,
            vec![Phase::AssetAdd, Phase::RelationAdd, Phase::RelationRemove, Phase::AssetRemove]
        );
    }

    #[test]
    fn plan_wraps_schema_changes_around_data() {
        let mut baseline = Graph::new();
        baseline.insert_asset(Asset::new("legacy", "x"));
        let mut desired = Graph::new();
        desired.insert_asset(host("a"));

        let phases: Vec<Phase> = plan(&desired.diff(&baseline), 10)
            .into_iter()
            .map(|(phase, _)| phase)
            .collect();
        assert_eq!(
            phases,
            vec![Phase::SchemaStaging, Phase::AssetAdd, Phase::AssetRemove, Phase::SchemaTarget]
        );
    }

    #[test]
    fn plan_chunks_each_set() {
        let mut desired = Graph::new();
        for i in 0..25 {
            desired.insert_asset(host(&format!("h{:02}", i)));
        }
        let mut baseline = Graph::new();
        *baseline.schema_mut() = desired.schema().clone();

        let phases = plan(&desired.diff(&baseline), 10);
        assert_eq!(phases.len(), 1);
        let (phase, chunks) = &phases[0];
        assert_eq!(*phase, Phase::AssetAdd);
        assert_eq!(chunks.iter().map(Chunk::len).collect::<Vec<_>>(), vec![10, 10, 5]);

        let indices: HashSet<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices.len(), 3);
    }

    #[test]
    fn empty_delta_has_no_phases() {
        let graph = Graph::new();
        assert!(plan(&graph.diff(&graph), 10).is_empty());
    }
}
