//! In-process graph store.
//!
//! Behaves like the remote API (store-assigned IDs, referential checks,
//! schema checks) and records every call. Faults can be injected per
//! operation or per element, which is how the engine's retry and
//! invalidation paths are exercised without a network.

use super::traits::{RemoteStore, StoreError, StoreOp, StoreResult};
use crate::graph::{Asset, AssetWithId, Graph, Relation, RelationWithId, SchemaGraph};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// A recorded write call
#[derive(Debug, Clone)]
pub struct StoreCall {
    pub op: StoreOp,
    /// Display form of every element in the call's batch
    pub elements: Vec<String>,
    /// Logical timestamp taken when the call started
    pub started: u64,
    /// Logical timestamp taken when the call returned
    pub finished: u64,
    pub result: StoreResult<()>,
}

impl StoreCall {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

struct Fault {
    op: StoreOp,
    element: Option<String>,
    error: StoreError,
    remaining: Option<usize>,
}

#[derive(Default)]
struct RemoteState {
    assets: BTreeMap<Asset, String>,
    relations: BTreeMap<Relation, String>,
    schema: SchemaGraph,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn rejected(message: String) -> StoreError {
    StoreError::Rejected { status: 400, message }
}

/// Graph store held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<RemoteState>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<Vec<Fault>>,
    read_fault: Mutex<Option<StoreError>>,
    reads: AtomicUsize,
    clock: AtomicU64,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `graph`
    pub fn with_graph(graph: &Graph) -> Self {
        let store = Self::new();
        {
            let mut state = lock(&store.state);
            state.schema = graph.schema().clone();
            for asset in graph.assets() {
                state.assets.insert(asset.clone(), Uuid::new_v4().to_string());
            }
            for relation in graph.relations() {
                state.relations.insert(relation.clone(), Uuid::new_v4().to_string());
            }
        }
        store
    }

    /// Delay every write call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call of `op`
    pub fn fail_op(&self, op: StoreOp, error: StoreError) {
        lock(&self.faults).push(Fault { op, element: None, error, remaining: None });
    }

    /// Fail the first `times` calls of `op`
    pub fn fail_times(&self, op: StoreOp, times: usize, error: StoreError) {
        lock(&self.faults).push(Fault { op, element: None, error, remaining: Some(times) });
    }

    /// Fail every call of `op` whose batch contains `element`
    pub fn fail_element(&self, op: StoreOp, element: impl ToString, error: StoreError) {
        lock(&self.faults).push(Fault {
            op,
            element: Some(element.to_string()),
            error,
            remaining: None,
        });
    }

    /// Fail every read until cleared with `None`
    pub fn set_read_fault(&self, error: Option<StoreError>) {
        *lock(&self.read_fault) = error;
    }

    /// Remove every injected write fault
    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    /// Number of full graph reads served (successful or not)
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every write call made so far, in completion order
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Write calls of one kind
    pub fn calls_for(&self, op: StoreOp) -> Vec<StoreCall> {
        lock(&self.calls).iter().filter(|c| c.op == op).cloned().collect()
    }

    /// The stored graph, without counting as a read
    pub fn snapshot(&self) -> Graph {
        let state = lock(&self.state);
        let mut graph = Graph::new();
        *graph.schema_mut() = state.schema.clone();
        for asset in state.assets.keys() {
            graph.insert_asset(asset.clone());
        }
        for relation in state.relations.keys() {
            // Stored relations always have stored endpoints
            let _ = graph.insert_relation(relation.clone());
        }
        graph
    }

    fn take_fault(&self, op: StoreOp, elements: &[String]) -> Option<StoreError> {
        let mut faults = lock(&self.faults);
        let index = faults.iter().position(|fault| {
            fault.op == op
                && fault.remaining != Some(0)
                && fault
                    .element
                    .as_ref()
                    .map_or(true, |wanted| elements.iter().any(|e| e == wanted))
        })?;
        let fault = &mut faults[index];
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(fault.error.clone())
    }

    async fn record<F>(&self, op: StoreOp, elements: Vec<String>, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut RemoteState) -> StoreResult<()>,
    {
        let started = self.clock.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.take_fault(op, &elements) {
            Some(error) => Err(error),
            None => apply(&mut lock(&self.state)),
        };

        let finished = self.clock.fetch_add(1, Ordering::SeqCst);
        lock(&self.calls).push(StoreCall {
            op,
            elements,
            started,
            finished,
            result: result.clone(),
        });
        result
    }
}

fn describe<T: std::fmt::Display>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read_graph(&self) -> StoreResult<Graph> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.read_fault).clone() {
            return Err(error);
        }

        let state = lock(&self.state);
        let ids: BTreeMap<&Asset, &String> = state.assets.iter().collect();
        let assets = state
            .assets
            .iter()
            .map(|(asset, id)| AssetWithId { id: id.clone(), asset: asset.clone() })
            .collect();
        let relations = state
            .relations
            .iter()
            .map(|(relation, id)| RelationWithId {
                id: id.clone(),
                from_id: ids.get(&relation.from).map(|s| s.to_string()).unwrap_or_default(),
                to_id: ids.get(&relation.to).map(|s| s.to_string()).unwrap_or_default(),
                relation_type: relation.relation_type.clone(),
            })
            .collect();

        let mut graph =
            Graph::from_read(assets, relations).map_err(|e| StoreError::Decode(e.to_string()))?;
        let schema = graph.schema().union(&state.schema);
        *graph.schema_mut() = schema;
        Ok(graph)
    }

    async fn put_schema(&self, schema: &SchemaGraph) -> StoreResult<()> {
        let schema = schema.clone();
        self.record(StoreOp::PutSchema, Vec::new(), move |state| {
            state.schema = schema;
            Ok(())
        })
        .await
    }

    async fn put_assets(&self, assets: &[Asset]) -> StoreResult<()> {
        self.record(StoreOp::PutAssets, describe(assets), |state| {
            if !state.schema.is_empty() {
                if let Some(asset) = assets.iter().find(|a| !state.schema.has_asset_type(&a.asset_type)) {
                    return Err(rejected(format!("unknown asset type '{}'", asset.asset_type)));
                }
            }
            for asset in assets {
                state
                    .assets
                    .entry(asset.clone())
                    .or_insert_with(|| Uuid::new_v4().to_string());
            }
            Ok(())
        })
        .await
    }

    async fn delete_assets(&self, assets: &[Asset]) -> StoreResult<()> {
        self.record(StoreOp::DeleteAssets, describe(assets), |state| {
            if let Some(relation) = state
                .relations
                .keys()
                .find(|r| assets.iter().any(|a| r.touches(a)))
            {
                return Err(StoreError::Rejected {
                    status: 409,
                    message: format!("asset still referenced by {}", relation),
                });
            }
            for asset in assets {
                state.assets.remove(asset);
            }
            Ok(())
        })
        .await
    }

    async fn put_relations(&self, relations: &[Relation]) -> StoreResult<()> {
        self.record(StoreOp::PutRelations, describe(relations), |state| {
            for relation in relations {
                if !state.assets.contains_key(&relation.from) || !state.assets.contains_key(&relation.to) {
                    return Err(rejected(format!("relation {} has a missing endpoint", relation)));
                }
                if !state.schema.is_empty() && !state.schema.has_relation_type(&relation.schema_type()) {
                    return Err(rejected(format!("unknown relation type {}", relation.schema_type())));
                }
            }
            for relation in relations {
                state
                    .relations
                    .entry(relation.clone())
                    .or_insert_with(|| Uuid::new_v4().to_string());
            }
            Ok(())
        })
        .await
    }

    async fn delete_relations(&self, relations: &[Relation]) -> StoreResult<()> {
        self.record(StoreOp::DeleteRelations, describe(relations), |state| {
            for relation in relations {
                state.relations.remove(relation);
            }
            Ok(())
        })
        .await
    }
}
