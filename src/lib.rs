//! kbsync: write-path client for a remote knowledge graph
//!
//! Keeps a graph of typed assets and relations in step with a remote store.
//! Each cycle diffs the graph the caller wants against the last known remote
//! graph and pushes only the difference, in ordered and chunked parallel
//! batches.
//!
//! # Core Concepts
//!
//! - **Graph**: assets keyed by `(type, key)`, relations between them, and the schema of types in use
//! - **Session**: holds a cached baseline, bounded by an anti-entropy window
//! - **Transaction**: one diff-and-push cycle; its outcome updates or invalidates the cache
//!
//! # Example
//!
//! ```
//! use kbsync::{Graph, GraphBinder, RelationType};
//!
//! let mut graph = Graph::new();
//! let mut binder = GraphBinder::new(&mut graph);
//! let runs = RelationType::new("host", "runs", "service");
//! binder.relate("web-1", &runs, "nginx").unwrap();
//! assert_eq!(graph.asset_count(), 2);
//! ```

pub mod graph;
pub mod store;
pub mod sync;

pub use graph::{
    Asset, AssetType, AssetWithId, Graph, GraphBinder, GraphDelta, GraphError, Relation,
    RelationKeyType, RelationType, RelationWithId, SchemaChange, SchemaGraph,
};
pub use store::{HttpStore, MemoryStore, RemoteStore, StoreCall, StoreError, StoreOp, StoreResult};
pub use sync::{
    CacheMode, CommitError, CommitOutcome, CommitPolicy, CommitReport, ConfigError, Session,
    SyncError, SyncOptions, SyncResult, Transaction, TransactionState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
