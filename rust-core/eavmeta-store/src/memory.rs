// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory versioned EAV store.
//
// Keeps every committed version of every document in a `BTreeMap` wrapped in
// a tokio `RwLock`. Transactions are processed one at a time under the write
// lock at submission, so each transaction function sees the effect of every
// transaction submitted before it. Snapshot reads take the read lock and see
// only versions at or below their basis transaction. An eviction is stored as
// a tombstone version; the history it hides is dropped once no open snapshot
// predates it. Intended for testing, development, and small ephemeral
// datasets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::backend::EavStore;
use crate::engine::{evaluate, DocumentSource};
use crate::error::StoreError;
use crate::query::{ConstraintQuery, QueryResult};
use crate::snapshot::{Pin, Snapshot, SnapshotRegistry};
use crate::tx::{TransactionFunction, TxContext, TxId, TxOp, TxOutcome, WriteOp};
use crate::value::{DocId, Document};

/// Default number of unclaimed transaction outcomes kept for `await_commit`.
pub const DEFAULT_OUTCOME_CAPACITY: usize = 10_000;

/// One committed version; `None` marks an eviction.
#[derive(Debug, Clone)]
struct Version {
    tx: u64,
    doc: Option<Document>,
}

/// The version of a history visible at `pin`.
///
/// A tombstone at or below the horizon hides everything before it.
fn visible(versions: &[Version], pin: Pin) -> Option<&Document> {
    let start = versions
        .iter()
        .rposition(|v| v.doc.is_none() && v.tx <= pin.horizon)
        .map_or(0, |i| i + 1);
    versions[start..]
        .iter()
        .rev()
        .find(|v| v.tx <= pin.basis)
        .and_then(|v| v.doc.as_ref())
}

#[derive(Debug, Default)]
struct State {
    /// Versions per document, ascending by transaction.
    docs: BTreeMap<DocId, Vec<Version>>,
    /// Documents whose history still holds a tombstone.
    evicted: BTreeSet<DocId>,
    /// Committed transactions and their times, ascending.
    log: Vec<(u64, DateTime<Utc>)>,
    next_tx: u64,
    /// Outcomes not yet claimed by `await_commit`, oldest first.
    outcomes: BTreeMap<TxId, TxOutcome>,
}

impl State {
    fn latest_pin(&self) -> Pin {
        let tx = self.last_committed();
        Pin { basis: tx, horizon: tx }
    }

    /// Drop history hidden by tombstones that no open snapshot predates.
    fn prune(&mut self, oldest_horizon: Option<u64>) {
        let mut settled = Vec::new();
        for id in &self.evicted {
            let Some(versions) = self.docs.get_mut(id) else {
                settled.push(id.clone());
                continue;
            };
            let cut = versions
                .iter()
                .rposition(|v| v.doc.is_none() && oldest_horizon.map_or(true, |h| v.tx <= h));
            if let Some(cut) = cut {
                versions.drain(..=cut);
            }
            if versions.is_empty() {
                self.docs.remove(id);
            }
            if !self.docs.get(id).is_some_and(|v| v.iter().any(|v| v.doc.is_none())) {
                settled.push(id.clone());
            }
        }
        for id in settled {
            self.evicted.remove(&id);
        }
    }

    fn last_committed(&self) -> u64 {
        self.log.last().map(|(tx, _)| *tx).unwrap_or(0)
    }

    fn basis_as_of(&self, as_of: DateTime<Utc>) -> u64 {
        let idx = self.log.partition_point(|(_, time)| *time <= as_of);
        if idx == 0 {
            0
        } else {
            self.log[idx - 1].0
        }
    }

    fn next_tx_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.log.last() {
            Some((_, last)) if now <= *last => *last + chrono::Duration::microseconds(1),
            _ => now,
        }
    }
}

/// Committed state as of one transaction.
struct View<'a> {
    docs: &'a BTreeMap<DocId, Vec<Version>>,
    pin: Pin,
}

impl DocumentSource for View<'_> {
    fn document(&self, id: &DocId) -> Option<&Document> {
        visible(self.docs.get(id)?, self.pin)
    }

    fn documents(&self) -> Box<dyn Iterator<Item = &Document> + '_> {
        let pin = self.pin;
        Box::new(self.docs.values().filter_map(move |versions| visible(versions, pin)))
    }
}

/// Latest committed state overlaid with a transaction's staged writes.
struct Staged<'a> {
    base: View<'a>,
    staged: &'a BTreeMap<DocId, Option<Document>>,
}

impl DocumentSource for Staged<'_> {
    fn document(&self, id: &DocId) -> Option<&Document> {
        match self.staged.get(id) {
            Some(staged) => staged.as_ref(),
            None => self.base.document(id),
        }
    }

    fn documents(&self) -> Box<dyn Iterator<Item = &Document> + '_> {
        Box::new(
            self.base
                .documents()
                .filter(|doc| !self.staged.contains_key(&doc.id))
                .chain(self.staged.values().filter_map(Option::as_ref)),
        )
    }
}

/// An in-memory implementation of [`EavStore`].
///
/// All data lives in process memory and is lost on drop. Cloning shares the
/// same underlying state.
#[derive(Clone)]
pub struct InMemoryEavStore {
    state: Arc<RwLock<State>>,
    functions: Arc<RwLock<HashMap<String, Arc<dyn TransactionFunction>>>>,
    snapshots: Arc<SnapshotRegistry>,
    outcome_capacity: usize,
}

impl Default for InMemoryEavStore {
    fn default() -> Self {
        Self::with_outcome_capacity(DEFAULT_OUTCOME_CAPACITY)
    }
}

impl InMemoryEavStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that keeps at most `capacity` unclaimed outcomes,
    /// forgetting the oldest first.
    pub fn with_outcome_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            functions: Arc::default(),
            snapshots: Arc::default(),
            outcome_capacity: capacity.max(1),
        }
    }

    /// Number of documents visible now.
    pub async fn document_count(&self) -> usize {
        let state = self.state.read().await;
        let view = View { docs: &state.docs, pin: state.latest_pin() };
        view.documents().count()
    }

    /// Number of stored versions of one document, tombstones excluded.
    pub async fn history_len(&self, id: &DocId) -> usize {
        self.state
            .read()
            .await
            .docs
            .get(id)
            .map(|versions| versions.iter().filter(|v| v.doc.is_some()).count())
            .unwrap_or(0)
    }

    /// Number of snapshot handles not yet released.
    pub fn open_snapshot_count(&self) -> usize {
        self.snapshots.open_count()
    }

    /// Number of transaction outcomes waiting to be claimed.
    pub async fn pending_outcomes(&self) -> usize {
        self.state.read().await.outcomes.len()
    }

    async fn prune_evicted(&self) -> Result<(), StoreError> {
        if self.state.read().await.evicted.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        let oldest = self.snapshots.oldest_horizon()?;
        state.prune(oldest);
        Ok(())
    }

    fn stage(staged: &mut BTreeMap<DocId, Option<Document>>, op: WriteOp) {
        match op {
            WriteOp::Put(doc) => {
                staged.insert(doc.id.clone(), Some(doc));
            }
            WriteOp::Evict(id) => {
                staged.insert(id, None);
            }
        }
    }

    /// Run every op of a transaction against the latest state and collect
    /// the staged write set, or the reason the transaction aborts.
    fn run_ops(
        state: &State,
        functions: &HashMap<String, Arc<dyn TransactionFunction>>,
        tx_id: TxId,
        tx_time: DateTime<Utc>,
        ops: Vec<TxOp>,
    ) -> Result<BTreeMap<DocId, Option<Document>>, String> {
        let mut staged = BTreeMap::new();
        let latest = state.latest_pin();
        for op in ops {
            match op {
                TxOp::Put(doc) => Self::stage(&mut staged, WriteOp::Put(doc)),
                TxOp::Evict(id) => Self::stage(&mut staged, WriteOp::Evict(id)),
                TxOp::Call { function, args } => {
                    let f = functions
                        .get(&function)
                        .ok_or_else(|| format!("unknown transaction function: {function}"))?;
                    let writes = {
                        let view = Staged {
                            base: View { docs: &state.docs, pin: latest },
                            staged: &staged,
                        };
                        let ctx = TxContext::new(tx_id, tx_time, &view);
                        catch_unwind(AssertUnwindSafe(|| f.invoke(&ctx, &args)))
                            .map_err(|payload| panic_message(&*payload))?
                            .map_err(|fault| format!("{function}: {fault}"))?
                    };
                    for write in writes {
                        Self::stage(&mut staged, write);
                    }
                }
            }
        }
        Ok(staged)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("transaction function panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("transaction function panicked: {s}")
    } else {
        "transaction function panicked".to_string()
    }
}

#[async_trait]
impl EavStore for InMemoryEavStore {
    async fn open_snapshot(&self, as_of: Option<DateTime<Utc>>) -> Result<Snapshot, StoreError> {
        let state = self.state.read().await;
        let horizon = state.last_committed();
        let (basis, at) = match as_of {
            Some(at) => (state.basis_as_of(at), at),
            None => (horizon, Utc::now()),
        };
        self.snapshots.open(basis, horizon, at)
    }

    async fn release_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.snapshots.release(snapshot)?;
        self.prune_evicted().await
    }

    async fn get(&self, snapshot: &Snapshot, id: &DocId) -> Result<Option<Document>, StoreError> {
        let pin = self.snapshots.pin_of(snapshot)?;
        let state = self.state.read().await;
        let view = View { docs: &state.docs, pin };
        Ok(view.document(id).cloned())
    }

    async fn query(&self, snapshot: &Snapshot, query: &ConstraintQuery) -> Result<QueryResult, StoreError> {
        let pin = self.snapshots.pin_of(snapshot)?;
        let state = self.state.read().await;
        let view = View { docs: &state.docs, pin };
        evaluate(&view, query)
    }

    async fn submit_tx(&self, ops: Vec<TxOp>) -> Result<TxId, StoreError> {
        let functions = self.functions.read().await;
        let mut state = self.state.write().await;

        state.next_tx += 1;
        let tx_id = TxId(state.next_tx);
        let tx_time = state.next_tx_time();

        let outcome = match Self::run_ops(&state, &functions, tx_id, tx_time, ops) {
            Ok(staged) => {
                let writes = staged.len();
                for (id, doc) in staged {
                    if doc.is_none() {
                        let live = state.docs.get(&id).and_then(|v| v.last()).is_some_and(|v| v.doc.is_some());
                        if !live {
                            continue;
                        }
                        state.evicted.insert(id.clone());
                    }
                    state.docs.entry(id).or_default().push(Version { tx: tx_id.0, doc });
                }
                state.log.push((tx_id.0, tx_time));
                if !state.evicted.is_empty() {
                    match self.snapshots.oldest_horizon() {
                        Ok(oldest) => state.prune(oldest),
                        Err(e) => warn!(error = %e, "evicted history kept"),
                    }
                }
                debug!(tx = %tx_id, writes, "transaction committed");
                TxOutcome { tx_id, committed: true, tx_time, fault: None, writes }
            }
            Err(fault) => {
                warn!(tx = %tx_id, fault = %fault, "transaction aborted");
                TxOutcome { tx_id, committed: false, tx_time, fault: Some(fault), writes: 0 }
            }
        };
        state.outcomes.insert(tx_id, outcome);
        while state.outcomes.len() > self.outcome_capacity {
            if let Some((forgotten, _)) = state.outcomes.pop_first() {
                debug!(tx = %forgotten, "unclaimed transaction outcome dropped");
            }
        }
        Ok(tx_id)
    }

    async fn await_commit(&self, tx: TxId, timeout: Duration) -> Result<TxOutcome, StoreError> {
        let mut state = tokio::time::timeout(timeout, self.state.write())
            .await
            .map_err(|_| StoreError::CommitTimeout(tx))?;
        state.outcomes.remove(&tx).ok_or(StoreError::UnknownTransaction(tx))
    }

    async fn register_function(&self, function: Arc<dyn TransactionFunction>) -> Result<(), StoreError> {
        let mut functions = self.functions.write().await;
        let name = function.name().to_string();
        if functions.contains_key(&name) {
            return Err(StoreError::DuplicateFunction(name));
        }
        debug!(function = %name, "transaction function registered");
        functions.insert(name, function);
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
