//! Core graph data structures

mod asset;
mod binder;
mod delta;
mod relation;
mod schema;
mod snapshot;

pub use asset::{Asset, AssetType, AssetWithId};
pub use binder::GraphBinder;
pub use delta::{GraphDelta, SchemaChange};
pub use relation::{Relation, RelationKeyType, RelationType, RelationWithId};
pub use schema::SchemaGraph;
pub use snapshot::{Graph, GraphError};
