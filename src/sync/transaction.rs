//! Transaction: one synchronization cycle against the remote store
//!
//! A transaction owns the baseline (the last known remote state) and a
//! desired graph the caller populates. Committing consumes the transaction
//! and yields a [`CommitOutcome`] exactly once.

use super::cancel::CancellationToken;
use super::committer::{failed_phase, CommitReport, Committer};
use super::error::CommitError;
use super::options::CommitPolicy;
use crate::graph::{Graph, GraphBinder, GraphDelta};
use crate::store::RemoteStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Diffing,
    Committing,
    Succeeded,
    Failed,
}

/// The result of a commit, to be handed back to the owning session.
#[derive(Debug)]
#[must_use = "a commit outcome must be completed on its session"]
pub enum CommitOutcome {
    /// Every chunk landed; `graph` is what the store now holds
    Applied {
        generation: u64,
        graph: Graph,
        report: CommitReport,
    },
    /// Some chunk failed permanently; the remote state is unknown
    Failed { generation: u64, error: CommitError },
}

impl CommitOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Applied { generation, .. } | Self::Failed { generation, .. } => *generation,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Terminal state the transaction reached
    pub fn state(&self) -> TransactionState {
        match self {
            Self::Applied { .. } => TransactionState::Succeeded,
            Self::Failed { .. } => TransactionState::Failed,
        }
    }
}

/// A single diff-and-push cycle.
///
/// Populate the desired graph through [`Transaction::binder`] (or replace it
/// with [`Transaction::set_desired`]), then call [`Transaction::commit`].
///
/// For mark-and-prune population, [`Transaction::seed_from_baseline`] starts
/// the desired graph as an unmarked copy of the baseline; after rebinding
/// everything still present, `desired_mut().retain_touched()` drops the rest.
pub struct Transaction {
    generation: u64,
    baseline: Graph,
    desired: Graph,
    store: Arc<dyn RemoteStore>,
    policy: CommitPolicy,
    cancel: CancellationToken,
    state: TransactionState,
}

impl Transaction {
    /// Create a transaction over `baseline` outside of any session
    pub fn new(store: Arc<dyn RemoteStore>, baseline: Graph, policy: CommitPolicy) -> Self {
        Self {
            generation: 0,
            baseline,
            desired: Graph::new(),
            store,
            policy,
            cancel: CancellationToken::new(),
            state: TransactionState::Created,
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    pub fn baseline(&self) -> &Graph {
        &self.baseline
    }

    pub fn desired(&self) -> &Graph {
        &self.desired
    }

    pub fn desired_mut(&mut self) -> &mut Graph {
        &mut self.desired
    }

    /// Binder over the desired graph
    pub fn binder(&mut self) -> GraphBinder<'_> {
        GraphBinder::new(&mut self.desired)
    }

    pub fn set_desired(&mut self, graph: Graph) {
        self.desired = graph;
    }

    /// Start the desired graph as an unmarked copy of the baseline
    pub fn seed_from_baseline(&mut self) {
        self.desired = self.baseline.clone();
        self.desired.clean();
    }

    /// Token that aborts this transaction's commit when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The delta a commit would push right now
    pub fn delta(&self) -> GraphDelta {
        self.desired.diff(&self.baseline)
    }

    fn transition(&mut self, next: TransactionState) {
        debug!(generation = self.generation, from = ?self.state, to = ?next, "Transaction state change");
        self.state = next;
    }

    /// Diff the desired graph against the baseline and push the delta.
    pub async fn commit(mut self) -> CommitOutcome {
        self.transition(TransactionState::Diffing);
        let delta = self.delta();
        info!(
            generation = self.generation,
            assets_to_add = delta.assets_to_add.len(),
            assets_to_remove = delta.assets_to_remove.len(),
            relations_to_add = delta.relations_to_add.len(),
            relations_to_remove = delta.relations_to_remove.len(),
            schema_change = delta.schema.is_some(),
            "Transaction diff computed"
        );

        self.transition(TransactionState::Committing);
        let committer = Committer::new(Arc::clone(&self.store), self.policy.clone(), self.cancel.clone());
        match committer.commit(&delta).await {
            Ok(report) => {
                self.transition(TransactionState::Succeeded);
                info!(
                    generation = self.generation,
                    chunks = report.chunks,
                    attempts = report.attempts,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Transaction committed"
                );
                CommitOutcome::Applied {
                    generation: self.generation,
                    graph: self.desired,
                    report,
                }
            }
            Err(error) => {
                self.transition(TransactionState::Failed);
                warn!(
                    generation = self.generation,
                    phase = ?failed_phase(&error),
                    error = %error,
                    "Transaction failed"
                );
                CommitOutcome::Failed {
                    generation: self.generation,
                    error,
                }
            }
        }
    }
}
