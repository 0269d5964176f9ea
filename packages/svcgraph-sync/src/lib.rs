//! svcgraph - keep a service dependency graph in step with registry snapshots
//!
//! One snapshot per transaction. A versioned advisory lock makes sure at
//! most one transaction mutates the graph at a time; inside it, every node
//! the snapshot mentions is upserted and stamped with the transaction id,
//! dependency edges are resolved, and whatever still carries an older
//! stamp is pruned.
//!
//! ```no_run
//! use svcgraph::{FileLockStore, MemoryGraph, Orchestrator, Snapshot, SyncConfig};
//!
//! let config = SyncConfig::default();
//! let locks = FileLockStore::open(&config.lock_dir).unwrap();
//! let graph = MemoryGraph::bind(&config.graph_path);
//! let mut orchestrator = Orchestrator::new(&config, locks, graph).unwrap();
//!
//! let snapshot = Snapshot::from_json(r#"{"Services": [{"Name": "api"}]}"#).unwrap();
//! let outcome = orchestrator.run(&snapshot, "msg-1").unwrap();
//! println!("{} pruned", outcome.report.pruned());
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod lock;
pub mod reconcile;
pub mod snapshot;
pub mod storage;
pub mod transaction;

pub use config::SyncConfig;
pub use error::{ConfigError, GraphError, LockError, SyncError};
pub use graph::{GraphStore, MemoryGraph, Upsert};
pub use lock::{FileLockStore, LockLease, LockManager, LockRecord, LockStore, MemoryLockStore};
pub use reconcile::{ReconcileReport, Reconciler};
pub use snapshot::{InstanceRecord, QueueEvent, QueueRecord, ServiceRecord, Snapshot, Tag};
pub use storage::{EdgeKind, EdgeRecord, NodeKind, NodeRecord, compute_node_id};
pub use transaction::{Orchestrator, TransactionOutcome, TxState};
