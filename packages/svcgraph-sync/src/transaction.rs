//! Transaction orchestration: acquire → reconcile → release
//!
//! # State machine
//!
//! ```text
//! Pending --(lock acquired)--> Reconciling --+--> Committed
//!                                            +--> Failed
//! ```
//!
//! The graph is reloaded from its store only after the lock is taken, and
//! the lock is released on the way out of `Reconciling` whatever the
//! outcome. A failed acquire ends the transaction in `Pending` without
//! touching the graph. Nothing is retried here; redelivery of the same
//! message (same transaction id) is the retry mechanism.

use std::fmt;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::graph::GraphStore;
use crate::lock::{LockLease, LockManager, LockStore};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::snapshot::{QueueEvent, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Reconciling,
    Committed,
    Failed,
}

impl TxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Pending => "pending",
            TxState::Reconciling => "reconciling",
            TxState::Committed => "committed",
            TxState::Failed => "failed",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub tx: String,
    pub state: TxState,
    pub lease: LockLease,
    pub report: ReconcileReport,
}

/// Drives one snapshot through a locked reconciliation.
///
/// Lock store and graph store are passed in, so several orchestrators can
/// share one lock store (`Arc<S>`) the way separate workers share one
/// lock table.
pub struct Orchestrator<S: LockStore, G: GraphStore> {
    locks: LockManager<S>,
    graph: G,
    lock_key: String,
    dependency_tag: String,
}

impl<S: LockStore, G: GraphStore> Orchestrator<S, G> {
    pub fn new(config: &SyncConfig, lock_store: S, graph: G) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            locks: LockManager::new(lock_store),
            graph,
            lock_key: config.lock_key.clone(),
            dependency_tag: config.dependency_tag.clone(),
        })
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn locks(&self) -> &LockManager<S> {
        &self.locks
    }

    /// Apply the queue entry contract, then run the one snapshot it carries.
    ///
    /// The record's message id becomes the transaction id. Multi-record
    /// batches and unparsable bodies fail before the lock is touched.
    pub fn handle_event(&mut self, event: &QueueEvent) -> Result<TransactionOutcome> {
        let record = event.single_record()?;
        let snapshot = record.snapshot()?;
        self.run(&snapshot, &record.message_id)
    }

    /// Run one transaction for `snapshot` stamped with `tx`.
    pub fn run(&mut self, snapshot: &Snapshot, tx: &str) -> Result<TransactionOutcome> {
        let mut state = TxState::Pending;
        tracing::info!(tx, %state, services = snapshot.services.len(), "transaction started");

        let lease = self.locks.acquire(&self.lock_key)?;
        state = self.transition(tx, state, TxState::Reconciling);

        let reconciled = self.reconcile(snapshot, tx);
        let released = self.locks.release(&self.lock_key);

        match (reconciled, released) {
            (Ok(report), Ok(())) => {
                self.transition(tx, state, TxState::Committed);
                tracing::info!(
                    tx,
                    version = lease.version,
                    created = report.services_created + report.instances_created,
                    pruned = report.pruned(),
                    missing_targets = report.missing_targets.len(),
                    "transaction committed"
                );
                Ok(TransactionOutcome {
                    tx: tx.to_string(),
                    state: TxState::Committed,
                    lease,
                    report,
                })
            }
            (Ok(_), Err(release_err)) => {
                self.transition(tx, state, TxState::Failed);
                Err(release_err.into())
            }
            (Err(err), released) => {
                if let Err(release_err) = released {
                    tracing::error!(tx, error = %release_err, "lock release failed after reconciliation failure");
                }
                self.transition(tx, state, TxState::Failed);
                Err(err)
            }
        }
    }

    fn reconcile(&mut self, snapshot: &Snapshot, tx: &str) -> Result<ReconcileReport> {
        self.graph.reload().map_err(SyncError::Reconciliation)?;
        let mut reconciler = Reconciler::new(&mut self.graph, self.dependency_tag.as_str());
        let report = reconciler
            .reconcile(snapshot, tx)
            .map_err(SyncError::Reconciliation)?;
        self.graph.flush().map_err(SyncError::Reconciliation)?;
        Ok(report)
    }

    fn transition(&self, tx: &str, from: TxState, to: TxState) -> TxState {
        tracing::info!(tx, %from, %to, "transaction state");
        to
    }
}
