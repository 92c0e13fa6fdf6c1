//! Errors surfaced by sessions and transactions

use super::chunk::Phase;
use super::options::ConfigError;
use crate::graph::GraphError;
use crate::store::StoreError;
use thiserror::Error;

/// Why a commit failed.
///
/// Any of these leaves the remote graph somewhere between the baseline and
/// the desired state.
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    #[error("{phase} chunk {chunk} failed after {attempts} attempt(s): {source}")]
    Chunk {
        phase: Phase,
        chunk: usize,
        attempts: usize,
        #[source]
        source: StoreError,
    },

    #[error("commit cancelled")]
    Cancelled,

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Errors returned by the synchronization API
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("create transaction: {0}")]
    CreateTransaction(#[source] StoreError),

    #[error("commit: {0}")]
    Commit(#[from] CommitError),

    #[error("read graph: {0}")]
    Read(#[source] StoreError),

    #[error("connect: {0}")]
    Connect(#[source] StoreError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("graph: {0}")]
    Graph(#[from] GraphError),
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
