//! Graph store API and in-memory implementation

pub mod memory;

pub use memory::MemoryGraph;

use crate::error::GraphError;
use crate::storage::{EdgeKind, EdgeRecord, NodeKind, NodeRecord};

pub type Result<T> = std::result::Result<T, GraphError>;

/// Result of an upsert-by-unique-key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    /// Existing node, stamp changed
    Updated,
    /// Existing node, stamp already current
    Unchanged,
}

/// Storage primitives the reconciler needs from a property-graph backend.
///
/// Nodes are unique by (kind, name); see `compute_node_id`. Every call
/// can fail because a real backend sits across a network.
///
/// Send + Sync required so a store can be shared behind a lock.
pub trait GraphStore: Send + Sync {
    // === NODE OPERATIONS ===

    /// Look up a node by its unique key. Absent is `Ok(None)`, not an error.
    fn get_node(&self, kind: NodeKind, name: &str) -> Result<Option<NodeRecord>>;

    /// Create the node, or overwrite the stamp of the existing one.
    fn upsert_node(&mut self, node: NodeRecord) -> Result<Upsert>;

    /// All live nodes of one kind
    fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<NodeRecord>>;

    /// Delete a node together with every incident edge.
    /// Returns false if the node did not exist.
    fn delete_node(&mut self, id: u128) -> Result<bool>;

    // === EDGE OPERATIONS ===

    /// Create a directed edge if both endpoints exist.
    ///
    /// Returns false (not an error) when an endpoint is missing. Adding an
    /// edge that is already present is a no-op that returns true.
    fn add_edge(&mut self, edge: EdgeRecord) -> Result<bool>;

    /// Returns false if the edge did not exist.
    fn delete_edge(&mut self, edge: EdgeRecord) -> Result<bool>;

    fn outgoing_edges(&self, src: u128, kind: EdgeKind) -> Result<Vec<EdgeRecord>>;

    fn incoming_edges(&self, dst: u128, kind: EdgeKind) -> Result<Vec<EdgeRecord>>;

    // === MAINTENANCE ===

    /// Replace in-memory state with the persisted image, dropping anything
    /// not yet flushed. Called once the sync lock is held. No-op for stores
    /// that keep no local copy.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    /// Persist pending changes. No-op for ephemeral stores.
    fn flush(&mut self) -> Result<()>;

    // === STATS ===

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;
}

/// Make `src` have exactly one outgoing edge of `kind`, pointing at `dst`.
///
/// Stale edges of the same kind are removed first. Returns false (and
/// leaves no edge of that kind) when `dst` does not exist.
pub fn replace_outgoing(
    graph: &mut dyn GraphStore,
    src: u128,
    dst: u128,
    kind: EdgeKind,
) -> Result<bool> {
    for edge in graph.outgoing_edges(src, kind)? {
        if edge.dst != dst {
            graph.delete_edge(edge)?;
        }
    }
    graph.add_edge(EdgeRecord::new(src, dst, kind))
}

/// Remove every outgoing edge of `kind` from `src`. Returns how many went.
pub fn clear_outgoing(graph: &mut dyn GraphStore, src: u128, kind: EdgeKind) -> Result<usize> {
    let mut removed = 0;
    for edge in graph.outgoing_edges(src, kind)? {
        if graph.delete_edge(edge)? {
            removed += 1;
        }
    }
    Ok(removed)
}
