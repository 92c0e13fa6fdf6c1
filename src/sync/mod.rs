//! Synchronization engine: sessions, transactions and the parallel committer
//!
//! A [`Session`] caches the last known remote graph. Each cycle asks it for a
//! [`Transaction`], fills in the desired graph, and commits. The committer
//! pushes the diff in ordered phases of bounded chunks, retrying transient
//! failures with a configurable backoff factor (nearly linear by default).

mod cancel;
mod chunk;
mod committer;
mod error;
pub mod options;
mod retry;
mod session;
mod transaction;

pub use cancel::CancellationToken;
pub use chunk::{partition, plan, Chunk, Payload, Phase};
pub use committer::{failed_phase, CommitReport, Committer};
pub use error::{CommitError, SyncError, SyncResult};
pub use options::{CacheMode, CommitPolicy, ConfigError, SyncOptions};
pub use retry::RetryPolicy;
pub use session::{stale_deadline, Session};
pub use transaction::{CommitOutcome, Transaction, TransactionState};
