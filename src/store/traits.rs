//! Remote store trait definitions

use crate::graph::{Asset, Graph, Relation, SchemaGraph};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a single store call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// True if the same call is likely to succeed when retried.
    ///
    /// Auth failures, rejected payloads and malformed responses never are.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Server { .. }
        )
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// The kind of a write call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    PutSchema,
    PutAssets,
    DeleteAssets,
    PutRelations,
    DeleteRelations,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PutSchema => "put-schema",
            Self::PutAssets => "put-assets",
            Self::DeleteAssets => "delete-assets",
            Self::PutRelations => "put-relations",
            Self::DeleteRelations => "delete-relations",
        };
        write!(f, "{}", name)
    }
}

/// The remote graph store, as seen by the synchronization engine.
///
/// Every method is a single network call that may fail transiently.
/// Implementations must be thread-safe: commits call them from many workers.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the full current graph
    async fn read_graph(&self) -> StoreResult<Graph>;

    /// Replace the store's schema
    async fn put_schema(&self, schema: &SchemaGraph) -> StoreResult<()>;

    /// Upsert a batch of assets
    async fn put_assets(&self, assets: &[Asset]) -> StoreResult<()>;

    /// Delete a batch of assets
    async fn delete_assets(&self, assets: &[Asset]) -> StoreResult<()>;

    /// Upsert a batch of relations
    async fn put_relations(&self, relations: &[Relation]) -> StoreResult<()>;

    /// Delete a batch of relations
    async fn delete_relations(&self, relations: &[Relation]) -> StoreResult<()>;
}
