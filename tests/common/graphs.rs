//! Graph builders

use kbsync::{Asset, Graph, Relation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn host(key: &str) -> Asset {
    Asset::new("host", key)
}

/// Shape of a generated graph
#[derive(Debug, Clone)]
pub struct GraphShape {
    pub asset_types: &'static [&'static str],
    pub relation_types: &'static [&'static str],
    pub max_assets: usize,
    pub max_relations: usize,
}

impl Default for GraphShape {
    fn default() -> Self {
        Self {
            asset_types: &["host", "ip", "service"],
            relation_types: &["has_ip", "runs", "depends_on"],
            max_assets: 60,
            max_relations: 90,
        }
    }
}

/// Random graph drawn from a small key space, so two graphs from different
/// seeds overlap.
pub fn random_graph(seed: u64, shape: &GraphShape) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = Graph::new();

    let asset_count = rng.gen_range(0..=shape.max_assets);
    let mut assets = Vec::with_capacity(asset_count);
    for _ in 0..asset_count {
        let asset_type = shape.asset_types[rng.gen_range(0..shape.asset_types.len())];
        let asset = Asset::new(asset_type, format!("k{}", rng.gen_range(0..40)));
        graph.insert_asset(asset.clone());
        assets.push(asset);
    }

    if !assets.is_empty() {
        for _ in 0..rng.gen_range(0..=shape.max_relations) {
            let from = assets[rng.gen_range(0..assets.len())].clone();
            let to = assets[rng.gen_range(0..assets.len())].clone();
            let relation_type = shape.relation_types[rng.gen_range(0..shape.relation_types.len())];
            graph
                .insert_relation(Relation::new(from, relation_type, to))
                .expect("endpoints were inserted above");
        }
    }
    graph
}
