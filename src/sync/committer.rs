//! Committer: pushes a graph delta to the store.
//!
//! The delta is laid out as ordered phases (see [`plan`]). Each phase is a
//! shared queue of chunks drained by a fixed pool of workers; every worker
//! pushes one chunk at a time and retries it locally. The phase ends when
//! every worker has returned, and only then does the next phase start.
//!
//! A chunk that fails permanently stops the other workers from pulling new
//! chunks or starting new attempts, wakes any worker in backoff, and fails
//! the whole commit. Calls already in flight finish.

use super::cancel::CancellationToken;
use super::chunk::{plan, Chunk, Phase};
use super::error::CommitError;
use super::options::CommitPolicy;
use super::retry::RetryPolicy;
use crate::graph::GraphDelta;
use crate::store::{RemoteStore, StoreError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a successful commit pushed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub assets_added: usize,
    pub assets_removed: usize,
    pub relations_added: usize,
    pub relations_removed: usize,
    pub schema_pushed: bool,
    /// Store calls that succeeded
    pub chunks: usize,
    /// Store calls attempted, retries included
    pub attempts: usize,
    pub elapsed: Duration,
}

impl CommitReport {
    fn for_delta(delta: &GraphDelta) -> Self {
        Self {
            assets_added: delta.assets_to_add.len(),
            assets_removed: delta.assets_to_remove.len(),
            relations_added: delta.relations_to_add.len(),
            relations_removed: delta.relations_to_remove.len(),
            schema_pushed: delta.schema.is_some(),
            ..Default::default()
        }
    }

    /// True if the commit had nothing to push
    pub fn is_noop(&self) -> bool {
        self.chunks == 0
    }
}

/// Pushes deltas with a bounded worker pool.
pub struct Committer {
    store: Arc<dyn RemoteStore>,
    policy: CommitPolicy,
    cancel: CancellationToken,
}

impl Committer {
    pub fn new(store: Arc<dyn RemoteStore>, policy: CommitPolicy, cancel: CancellationToken) -> Self {
        Self { store, policy, cancel }
    }

    /// Push every phase of `delta`, in order.
    pub async fn commit(&self, delta: &GraphDelta) -> Result<CommitReport, CommitError> {
        let started = Instant::now();
        let mut report = CommitReport::for_delta(delta);

        for (phase, chunks) in plan(delta, self.policy.chunk_size) {
            if self.cancel.is_cancelled() {
                return Err(CommitError::Cancelled);
            }

            let count = chunks.len();
            info!(%phase, chunks = count, "Starting commit phase");
            let attempts = self.run_phase(chunks).await?;
            debug!(%phase, chunks = count, attempts, "Commit phase complete");

            report.chunks += count;
            report.attempts += attempts;
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Drain one phase's chunks with the worker pool and wait for all workers.
    ///
    /// Returns the number of store calls attempted.
    async fn run_phase(&self, chunks: Vec<Chunk>) -> Result<usize, CommitError> {
        let workers = self.policy.parallelization.clamp(1, chunks.len().max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(chunks)));
        let abort = CancellationToken::new();

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                store: Arc::clone(&self.store),
                queue: Arc::clone(&queue),
                abort: abort.clone(),
                cancel: self.cancel.clone(),
                retry: self.policy.retry.clone(),
                call_timeout: self.policy.call_timeout,
            };
            pool.spawn(worker.run());
        }

        let mut attempts = 0;
        let mut failure: Option<CommitError> = None;
        while let Some(joined) = pool.join_next().await {
            let error = match joined {
                Ok(Ok(worker_attempts)) => {
                    attempts += worker_attempts;
                    continue;
                }
                Ok(Err(error)) => error,
                Err(join_error) => CommitError::Worker(join_error.to_string()),
            };
            abort.cancel();
            failure.get_or_insert(error);
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(attempts),
        }
    }
}

struct Worker {
    id: usize,
    store: Arc<dyn RemoteStore>,
    queue: Arc<Mutex<VecDeque<Chunk>>>,
    /// Fires when any chunk of the phase fails permanently
    abort: CancellationToken,
    cancel: CancellationToken,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Worker {
    fn next_chunk(&self) -> Option<Chunk> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    async fn run(self) -> Result<usize, CommitError> {
        let mut attempts = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(CommitError::Cancelled);
            }
            if self.aborted() {
                return Ok(attempts);
            }
            let Some(chunk) = self.next_chunk() else {
                return Ok(attempts);
            };
            attempts += self.push_with_retry(&chunk).await?;
        }
    }

    async fn attempt(&self, chunk: &Chunk) -> Result<(), StoreError> {
        match tokio::time::timeout(self.call_timeout, chunk.push(self.store.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.call_timeout)),
        }
    }

    /// Push one chunk, retrying transient failures. Returns the attempts used.
    async fn push_with_retry(&self, chunk: &Chunk) -> Result<usize, CommitError> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CommitError::Cancelled),
                result = self.attempt(chunk) => result,
            };

            let error = match result {
                Ok(()) => {
                    debug!(
                        worker = self.id,
                        phase = %chunk.phase,
                        chunk = chunk.index,
                        size = chunk.len(),
                        attempts = attempt + 1,
                        "Chunk pushed"
                    );
                    return Ok(attempt + 1);
                }
                Err(error) => error,
            };

            if !self.retry.should_retry(attempt, &error) || self.aborted() {
                warn!(
                    worker = self.id,
                    phase = %chunk.phase,
                    chunk = chunk.index,
                    attempts = attempt + 1,
                    error = %error,
                    "Chunk push failed permanently"
                );
                return Err(CommitError::Chunk {
                    phase: chunk.phase,
                    chunk: chunk.index,
                    attempts: attempt + 1,
                    source: error,
                });
            }

            let delay = self.retry.delay(attempt);
            debug!(
                worker = self.id,
                phase = %chunk.phase,
                chunk = chunk.index,
                attempt = attempt + 1,
                ?delay,
                error = %error,
                "Chunk push failed, retrying"
            );
            let aborted = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CommitError::Cancelled),
                _ = self.abort.cancelled() => true,
                _ = tokio::time::sleep(delay) => self.aborted(),
            };
            if aborted {
                debug!(
                    worker = self.id,
                    phase = %chunk.phase,
                    chunk = chunk.index,
                    "Phase failed elsewhere, abandoning retries"
                );
                return Err(CommitError::Chunk {
                    phase: chunk.phase,
                    chunk: chunk.index,
                    attempts: attempt + 1,
                    source: error,
                });
            }
            attempt += 1;
        }
    }
}

/// Phase of the first permanently failed chunk, if any
pub fn failed_phase(error: &CommitError) -> Option<Phase> {
    match error {
        CommitError::Chunk { phase, .. } => Some(*phase),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Asset, Graph, Relation};
    use crate::store::{MemoryStore, StoreOp};
    use std::time::Duration;

    fn host(key: &str) -> Asset {
        Asset::new("host", key)
    }

    fn fast_policy(parallelization: usize, chunk_size: usize, max_retries: usize) -> CommitPolicy {
        CommitPolicy {
            parallelization,
            chunk_size,
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.01,
            },
            call_timeout: Duration::from_secs(5),
        }
    }

    fn hosts(n: usize) -> Graph {
        let mut graph = Graph::new();
        for i in 0..n {
            graph.insert_asset(host(&format!("h{:03}", i)));
        }
        graph
    }

    fn committer(store: &Arc<MemoryStore>, policy: CommitPolicy) -> Committer {
        Committer::new(store.clone(), policy, CancellationToken::new())
    }

    #[tokio::test]
    async fn pushes_every_chunk() {
        let store = Arc::new(MemoryStore::new());
        let desired = hosts(25);

        let report = committer(&store, fast_policy(4, 10, 0))
            .commit(&desired.diff(&Graph::new()))
            .await
            .unwrap();

        // schema staging + 3 asset chunks
        assert_eq!(report.chunks, 4);
        assert_eq!(report.assets_added, 25);
        assert_eq!(store.snapshot(), desired);
    }

    #[tokio::test]
    async fn empty_delta_makes_no_calls() {
        let store = Arc::new(MemoryStore::new());
        let graph = hosts(3);

        let report = committer(&store, fast_policy(4, 10, 0))
            .commit(&graph.diff(&graph))
            .await
            .unwrap();

        assert!(report.is_noop());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn always_failing_chunk_is_tried_max_retries_plus_one_times() {
        let store = Arc::new(MemoryStore::new());
        store.fail_op(StoreOp::PutAssets, StoreError::Transport("connection reset".into()));

        let mut desired = Graph::new();
        desired.insert_asset(host("a"));
        let mut baseline = Graph::new();
        *baseline.schema_mut() = desired.schema().clone();

        let err = committer(&store, fast_policy(1, 10, 4))
            .commit(&desired.diff(&baseline))
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::Chunk { attempts: 5, .. }));
        assert_eq!(store.calls_for(StoreOp::PutAssets).len(), 5);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let store = Arc::new(MemoryStore::new());
        store.fail_op(
            StoreOp::PutAssets,
            StoreError::Unauthorized { status: 401, message: "bad token".into() },
        );

        let desired = hosts(1);
        let mut baseline = Graph::new();
        *baseline.schema_mut() = desired.schema().clone();

        let err = committer(&store, fast_policy(1, 10, 10))
            .commit(&desired.diff(&baseline))
            .await
            .unwrap_err();

        assert_eq!(failed_phase(&err), Some(Phase::AssetAdd));
        assert_eq!(store.calls_for(StoreOp::PutAssets).len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_recover_within_budget() {
        let store = Arc::new(MemoryStore::new());
        store.fail_times(StoreOp::PutAssets, 2, StoreError::Server { status: 503, message: String::new() });

        let desired = hosts(1);
        let report = committer(&store, fast_policy(1, 10, 3))
            .commit(&desired.diff(&Graph::new()))
            .await
            .unwrap();

        // schema staging once, assets three times
        assert_eq!(report.attempts, 4);
        assert_eq!(store.snapshot(), desired);
    }

    #[tokio::test]
    async fn slow_calls_time_out_and_count_as_transient() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(200)));
        let mut policy = fast_policy(1, 10, 1);
        policy.call_timeout = Duration::from_millis(10);

        let err = committer(&store, policy)
            .commit(&hosts(1).diff(&Graph::new()))
            .await
            .unwrap_err();

        match err {
            CommitError::Chunk { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, StoreError::Timeout(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn assets_land_before_relations() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));

        let mut desired = hosts(20);
        for i in 1..20 {
            desired
                .insert_relation(Relation::new(host("h000"), "connects", host(&format!("h{:03}", i))))
                .unwrap();
        }

        committer(&store, fast_policy(8, 3, 0))
            .commit(&desired.diff(&Graph::new()))
            .await
            .unwrap();

        let last_asset = store
            .calls_for(StoreOp::PutAssets)
            .iter()
            .map(|c| c.finished)
            .max()
            .unwrap();
        let first_relation = store
            .calls_for(StoreOp::PutRelations)
            .iter()
            .map(|c| c.started)
            .min()
            .unwrap();
        assert!(last_asset < first_relation);
        assert_eq!(store.snapshot(), desired);
    }

    #[tokio::test]
    async fn workers_run_chunks_in_parallel() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        let desired = hosts(8);
        let mut baseline = Graph::new();
        *baseline.schema_mut() = desired.schema().clone();

        committer(&store, fast_policy(8, 1, 0))
            .commit(&desired.diff(&baseline))
            .await
            .unwrap();

        let calls = store.calls_for(StoreOp::PutAssets);
        let first_finish = calls.iter().map(|c| c.finished).min().unwrap();
        let overlapping = calls.iter().filter(|c| c.started < first_finish).count();
        assert!(overlapping > 1);
    }

    #[tokio::test]
    async fn phase_failure_wakes_workers_in_backoff() {
        let store = Arc::new(MemoryStore::new());
        store.fail_element(
            StoreOp::PutAssets,
            host("h000"),
            StoreError::Rejected { status: 400, message: "bad key".into() },
        );
        store.fail_element(
            StoreOp::PutAssets,
            host("h001"),
            StoreError::Server { status: 503, message: String::new() },
        );

        let desired = hosts(2);
        let mut baseline = Graph::new();
        *baseline.schema_mut() = desired.schema().clone();
        let mut policy = fast_policy(2, 1, 5);
        policy.retry.base_delay = Duration::from_millis(500);

        let started = Instant::now();
        let err = committer(&store, policy)
            .commit(&desired.diff(&baseline))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(400));
        match err {
            CommitError::Chunk { chunk, source, .. } => {
                assert_eq!(chunk, 0);
                assert!(matches!(source, StoreError::Rejected { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        let retried = store
            .calls_for(StoreOp::PutAssets)
            .iter()
            .filter(|call| call.elements == vec![host("h001").to_string()])
            .count();
        assert!(retried <= 1, "h001 pushed {} times", retried);
    }

    #[tokio::test]
    async fn cancellation_aborts_backoff() {
        let store = Arc::new(MemoryStore::new());
        store.fail_op(StoreOp::PutAssets, StoreError::Transport("reset".into()));

        let mut policy = fast_policy(1, 10, 10);
        policy.retry.base_delay = Duration::from_secs(60);
        let cancel = CancellationToken::new();
        let committer = Committer::new(store.clone(), policy, cancel.clone());

        let desired = hosts(1);
        let delta = desired.diff(&Graph::new());
        let handle = tokio::spawn(async move { committer.commit(&delta).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("commit should stop promptly")
            .unwrap();
        assert!(matches!(result, Err(CommitError::Cancelled)));
    }
}
