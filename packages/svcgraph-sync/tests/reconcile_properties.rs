//! Property tests: reconciliation converges on the latest snapshot.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use svcgraph::{
    EdgeKind, GraphStore, MemoryGraph, NodeKind, Reconciler, ServiceRecord, Snapshot,
};

const TAG: &str = "NEO4J_RELATIONSHIP_TO_SERVICE";

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Up to 8 services drawn from a small name pool so snapshots overlap.
/// Instance names are globally unique per snapshot (instance ids are).
fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map(0u8..10, (0usize..3, prop::option::of(0u8..12)), 0..8).prop_map(
        |services| Snapshot {
            services: services
                .into_iter()
                .map(|(id, (instances, dep))| {
                    let mut service = ServiceRecord::new(format!("svc-{}", id));
                    for n in 0..instances {
                        service = service.instance(format!("i-{}-{}", id, n));
                    }
                    if let Some(dep) = dep {
                        service = service.tag(TAG, format!("svc-{}", dep));
                    }
                    service
                })
                .collect(),
        },
    )
}

// ---------------------------------------------------------------------------
// Graph fingerprint
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct Shape {
    nodes: BTreeMap<(NodeKind, String), String>,
    edges: BTreeSet<(u128, u128, EdgeKind)>,
}

fn shape(graph: &MemoryGraph) -> Shape {
    let mut nodes = BTreeMap::new();
    let mut edges = BTreeSet::new();
    for kind in [NodeKind::Service, NodeKind::Instance] {
        for node in graph.nodes_of_kind(kind).unwrap() {
            for edge_kind in [EdgeKind::DependsOn, EdgeKind::RegisteredWith] {
                for e in graph.outgoing_edges(node.id, edge_kind).unwrap() {
                    edges.insert((e.src, e.dst, e.kind));
                }
            }
            nodes.insert((kind, node.name), node.stamp);
        }
    }
    Shape { nodes, edges }
}

fn names(snapshot: &Snapshot) -> BTreeSet<(NodeKind, String)> {
    let mut out = BTreeSet::new();
    for service in &snapshot.services {
        out.insert((NodeKind::Service, service.name.clone()));
        for instance in &service.instances {
            out.insert((NodeKind::Instance, instance.id.clone()));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn reconcile_twice_same_stamp_is_idempotent(snapshot in snapshot_strategy()) {
        let mut graph = MemoryGraph::create_ephemeral();
        Reconciler::new(&mut graph, TAG).reconcile(&snapshot, "tx").unwrap();
        let first = shape(&graph);

        Reconciler::new(&mut graph, TAG).reconcile(&snapshot, "tx").unwrap();
        prop_assert_eq!(first, shape(&graph));
    }

    #[test]
    fn graph_matches_latest_snapshot(s1 in snapshot_strategy(), s2 in snapshot_strategy()) {
        let mut graph = MemoryGraph::create_ephemeral();
        Reconciler::new(&mut graph, TAG).reconcile(&s1, "tx1").unwrap();
        Reconciler::new(&mut graph, TAG).reconcile(&s2, "tx2").unwrap();

        let after = shape(&graph);
        let present: BTreeSet<(NodeKind, String)> = after.nodes.keys().cloned().collect();
        prop_assert_eq!(&present, &names(&s2));
        prop_assert!(after.nodes.values().all(|stamp| stamp == "tx2"));

        // Same as reconciling s2 into an empty graph, modulo nothing
        let mut fresh = MemoryGraph::create_ephemeral();
        Reconciler::new(&mut fresh, TAG).reconcile(&s2, "tx2").unwrap();
        prop_assert_eq!(after, shape(&fresh));
    }

    #[test]
    fn new_stamp_over_same_snapshot_prunes_nothing(snapshot in snapshot_strategy()) {
        let mut graph = MemoryGraph::create_ephemeral();
        Reconciler::new(&mut graph, TAG).reconcile(&snapshot, "tx1").unwrap();
        let before = graph.node_count();
        let edges_before = graph.edge_count();

        let report = Reconciler::new(&mut graph, TAG).reconcile(&snapshot, "tx2").unwrap();
        prop_assert_eq!(report.pruned(), 0);
        prop_assert_eq!(graph.node_count(), before);
        prop_assert_eq!(graph.edge_count(), edges_before);
    }
}
