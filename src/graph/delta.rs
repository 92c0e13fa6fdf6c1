//! GraphDelta: the difference between a desired graph and a baseline

use super::asset::Asset;
use super::relation::Relation;
use super::schema::SchemaGraph;
use super::snapshot::Graph;

/// Schema pushes needed by a delta.
///
/// The store's schema is replaced wholesale, so a change is pushed in two
/// steps: `staging` (both schemas merged) before any data, so new types exist
/// when assets use them and old types still exist while their elements are
/// removed; then `target` once every removal has landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    pub staging: SchemaGraph,
    pub target: SchemaGraph,
}

impl SchemaChange {
    /// True if a final push is needed after the removals
    pub fn needs_target_push(&self) -> bool {
        self.staging != self.target
    }
}

/// The four disjoint sets that turn a baseline into a desired graph.
///
/// Sets are computed by identity and are sorted, so chunking is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDelta {
    pub schema: Option<SchemaChange>,
    pub assets_to_add: Vec<Asset>,
    pub assets_to_remove: Vec<Asset>,
    pub relations_to_add: Vec<Relation>,
    pub relations_to_remove: Vec<Relation>,
}

impl GraphDelta {
    /// Diff `desired` against `baseline`. Neither graph is mutated.
    pub fn between(desired: &Graph, baseline: &Graph) -> Self {
        let assets_to_add = desired
            .assets()
            .filter(|a| !baseline.contains_asset(a))
            .cloned()
            .collect();
        let assets_to_remove = baseline
            .assets()
            .filter(|a| !desired.contains_asset(a))
            .cloned()
            .collect();
        let relations_to_add = desired
            .relations()
            .filter(|r| !baseline.contains_relation(r))
            .cloned()
            .collect();
        let relations_to_remove = baseline
            .relations()
            .filter(|r| !desired.contains_relation(r))
            .cloned()
            .collect();

        let schema = (desired.schema() != baseline.schema()).then(|| SchemaChange {
            staging: desired.schema().union(baseline.schema()),
            target: desired.schema().clone(),
        });

        Self {
            schema,
            assets_to_add,
            assets_to_remove,
            relations_to_add,
            relations_to_remove,
        }
    }

    /// True if there is nothing to push
    pub fn is_empty(&self) -> bool {
        self.schema.is_none()
            && self.assets_to_add.is_empty()
            && self.assets_to_remove.is_empty()
            && self.relations_to_add.is_empty()
            && self.relations_to_remove.is_empty()
    }

    /// Total number of elements added or removed
    pub fn element_count(&self) -> usize {
        self.assets_to_add.len()
            + self.assets_to_remove.len()
            + self.relations_to_add.len()
            + self.relations_to_remove.len()
    }

    /// Apply the delta to a baseline, in the order a commit pushes it.
    pub fn apply(&self, baseline: &Graph) -> Graph {
        let mut graph = baseline.clone();
        for asset in &self.assets_to_add {
            graph.insert_asset(asset.clone());
        }
        for relation in &self.relations_to_add {
            // A valid delta only adds relations between present assets
            let _ = graph.insert_relation(relation.clone());
        }
        for relation in &self.relations_to_remove {
            graph.remove_relation(relation);
        }
        for asset in &self.assets_to_remove {
            graph.remove_asset(asset);
        }
        if let Some(change) = &self.schema {
            *graph.schema_mut() = change.target.clone();
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn host(key: &str) -> Asset {
        Asset::new("host", key)
    }

    fn random_graph(rng: &mut StdRng) -> Graph {
        let mut graph = Graph::new();
        let keys: Vec<String> = (0..12)
            .filter(|_| rng.gen_bool(0.6))
            .map(|i| format!("n{}", i))
            .collect();
        for key in &keys {
            graph.insert_asset(host(key));
        }
        for from in &keys {
            for to in &keys {
                if from != to && rng.gen_bool(0.15) {
                    graph
                        .insert_relation(Relation::new(host(from), "connects", host(to)))
                        .unwrap();
                }
            }
        }
        graph
    }

    #[test]
    fn identical_graphs_have_empty_delta() {
        let mut graph = Graph::new();
        graph.insert_asset(host("a"));
        assert!(graph.diff(&graph.clone()).is_empty());
    }

    #[test]
    fn diff_ignores_marks() {
        let mut graph = Graph::new();
        graph.insert_asset(host("a"));
        let mut cleaned = graph.clone();
        cleaned.clean();
        assert!(graph.diff(&cleaned).is_empty());
    }

    #[test]
    fn diff_splits_adds_and_removes() {
        let mut baseline = Graph::new();
        baseline.insert_asset(host("a"));
        baseline.insert_asset(host("old"));

        let mut desired = Graph::new();
        desired.insert_asset(host("a"));
        desired.insert_asset(host("b"));
        desired
            .insert_relation(Relation::new(host("a"), "connects", host("b")))
            .unwrap();

        let delta = desired.diff(&baseline);
        assert_eq!(delta.assets_to_add, vec![host("b")]);
        assert_eq!(delta.assets_to_remove, vec![host("old")]);
        assert_eq!(
            delta.relations_to_add,
            vec![Relation::new(host("a"), "connects", host("b"))]
        );
        assert!(delta.relations_to_remove.is_empty());
    }

    #[test]
    fn schema_change_stages_union_then_target() {
        let mut baseline = Graph::new();
        baseline.insert_asset(Asset::new("legacy", "x"));

        let mut desired = Graph::new();
        desired.insert_asset(host("a"));

        let change = desired.diff(&baseline).schema.unwrap();
        assert_eq!(change.staging.asset_types.len(), 2);
        assert_eq!(change.target, *desired.schema());
        assert!(change.needs_target_push());
    }

    #[test]
    fn additive_schema_change_needs_single_push() {
        let mut baseline = Graph::new();
        baseline.insert_asset(host("a"));

        let mut desired = baseline.clone();
        desired.insert_asset(Asset::new("ip", "10.0.0.1"));

        let change = desired.diff(&baseline).schema.unwrap();
        assert!(!change.needs_target_push());
    }

    #[test]
    fn applying_delta_reconstructs_desired_graph() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let desired = random_graph(&mut rng);
            let baseline = random_graph(&mut rng);

            let delta = desired.diff(&baseline);
            let rebuilt = delta.apply(&baseline);

            assert!(rebuilt.assets().eq(desired.assets()));
            assert!(rebuilt.relations().eq(desired.relations()));
        }
    }
}
