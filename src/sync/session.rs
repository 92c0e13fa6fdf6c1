//! Session: a staleness-bounded cache of the remote graph
//!
//! The session holds one cache slot. Creating a transaction moves the cached
//! graph into the transaction as its baseline; completing the transaction's
//! outcome either puts the committed graph back or leaves the slot empty so
//! the next cycle re-reads ground truth.

use super::error::{SyncError, SyncResult};
use super::options::{CommitPolicy, SyncOptions};
use super::transaction::{CommitOutcome, Transaction};
use super::committer::CommitReport;
use crate::graph::Graph;
use crate::store::{HttpStore, RemoteStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deadline after which a freshly read graph is no longer trusted.
///
/// `now + window + jitter`, with jitter uniform over `[-window/4, +window/4]`
/// so many clients do not re-read at the same instant.
pub fn stale_deadline<R: Rng + ?Sized>(now: DateTime<Utc>, window: Duration, rng: &mut R) -> DateTime<Utc> {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX / 2).min(i64::MAX / 2);
    let quarter = window_ms / 4;
    let jitter = if quarter > 0 { rng.gen_range(-quarter..=quarter) } else { 0 };
    now.checked_add_signed(chrono::Duration::milliseconds(window_ms + jitter))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Brokers transactions against one remote store.
///
/// Only one transaction per session is expected to be in flight; outcomes of
/// superseded transactions invalidate the cache instead of replacing it.
pub struct Session {
    store: Arc<dyn RemoteStore>,
    options: SyncOptions,
    policy: CommitPolicy,
    cache: Option<Graph>,
    stale_after: Option<DateTime<Utc>>,
    generation: u64,
}

impl Session {
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        let policy = options.resolve();
        Self {
            store,
            options,
            policy,
            cache: None,
            stale_after: None,
            generation: 0,
        }
    }

    /// Create a session talking HTTP to `options.url`
    pub fn connect(options: SyncOptions) -> SyncResult<Self> {
        options.validate()?;
        let store = HttpStore::new(&options.url, &options.auth_token, options.skip_verify)
            .map_err(SyncError::Connect)?;
        Ok(Self::new(Arc::new(store), options))
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    pub fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store)
    }

    /// True if a cached baseline is held
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn cached_graph(&self) -> Option<&Graph> {
        self.cache.as_ref()
    }

    /// Deadline of the current cache window, if caching is enabled
    pub fn stale_after(&self) -> Option<DateTime<Utc>> {
        self.stale_after
    }

    /// Drop the cached graph so the next transaction re-reads
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Read the remote graph, bypassing the cache
    pub async fn read_current_graph(&self) -> SyncResult<Graph> {
        self.store.read_graph().await.map_err(SyncError::Read)
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.stale_after.is_some_and(|deadline| now < deadline)
    }

    /// Hand out a transaction whose baseline is a fresh-enough remote graph.
    ///
    /// Reads the remote graph if nothing is cached or the window has passed.
    /// A failed read leaves the cache empty.
    pub async fn create_transaction(&mut self) -> SyncResult<Transaction> {
        let fresh = self.is_fresh(Utc::now());
        let mut baseline = match self.cache.take() {
            Some(graph) if fresh => {
                debug!(assets = graph.asset_count(), "Using cached graph as baseline");
                graph
            }
            _ => {
                debug!("Fetching remote graph");
                let graph = self
                    .store
                    .read_graph()
                    .await
                    .map_err(SyncError::CreateTransaction)?;
                self.stale_after = self
                    .options
                    .anti_entropy()
                    .map(|window| stale_deadline(Utc::now(), window, &mut rand::thread_rng()));
                info!(
                    assets = graph.asset_count(),
                    relations = graph.relation_count(),
                    stale_after = ?self.stale_after,
                    "Fetched remote graph"
                );
                graph
            }
        };

        baseline.clean();
        self.generation += 1;
        Ok(Transaction::new(Arc::clone(&self.store), baseline, self.policy.clone())
            .with_generation(self.generation))
    }

    /// Consume a transaction's outcome, updating or invalidating the cache.
    ///
    /// Only the newest transaction's successful outcome is cached. A failed or
    /// superseded outcome leaves the remote state unknown, so it also voids
    /// every transaction still outstanding: their outcomes will not be cached
    /// either.
    pub fn complete(&mut self, outcome: CommitOutcome) -> SyncResult<CommitReport> {
        match outcome {
            CommitOutcome::Applied { generation, graph, report } if generation == self.generation => {
                self.cache = Some(graph);
                Ok(report)
            }
            CommitOutcome::Applied { generation, report, .. } => {
                warn!(
                    generation,
                    current = self.generation,
                    "Superseded transaction committed, clearing graph cache"
                );
                self.void_outstanding();
                Ok(report)
            }
            CommitOutcome::Failed { error, .. } => {
                debug!(error = %error, "Clearing graph cache because of failed commit");
                self.void_outstanding();
                Err(error.into())
            }
        }
    }

    fn void_outstanding(&mut self) {
        self.cache = None;
        self.generation += 1;
    }

    /// Commit a transaction and complete its outcome
    pub async fn commit(&mut self, transaction: Transaction) -> SyncResult<CommitReport> {
        let outcome = transaction.commit().await;
        self.complete(outcome)
    }

    /// Run a whole cycle: make `desired` the remote graph
    pub async fn synchronize(&mut self, desired: Graph) -> SyncResult<CommitReport> {
        let mut transaction = self.create_transaction().await?;
        transaction.set_desired(desired);
        self.commit(transaction).await
    }
}
