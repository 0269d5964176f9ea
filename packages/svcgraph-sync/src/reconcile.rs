//! Reconciler - merge a snapshot into the graph, then prune what it lacks
//!
//! Every node touched by a run is stamped with that run's transaction id.
//! After the merge, anything still carrying an older stamp was absent from
//! the snapshot and is deleted. Re-running with the same snapshot and the
//! same id changes nothing; a new id over the same snapshot only refreshes
//! stamps.
//!
//! Passes run strictly in order:
//!
//! 1. upsert services and their instances (+ `REGISTERED` edges)
//! 2. resolve `DEP_ON` edges from the dependency tag; a target may appear
//!    later in the snapshot, so this waits until every service exists
//! 3. prune instances, then services, so no instance outlives its service

use crate::error::GraphError;
use crate::graph::{self, GraphStore, Upsert};
use crate::snapshot::{ServiceRecord, Snapshot};
use crate::storage::{EdgeKind, NodeKind, NodeRecord, compute_node_id};

type Result<T> = std::result::Result<T, GraphError>;

/// Counters collected across the passes of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub services_created: usize,
    pub services_updated: usize,
    pub instances_created: usize,
    pub instances_updated: usize,
    pub dependencies_linked: usize,
    /// (source service, missing target) pairs skipped in the edge pass
    pub missing_targets: Vec<(String, String)>,
    pub instances_pruned: usize,
    pub services_pruned: usize,
}

impl ReconcileReport {
    fn record_upsert(&mut self, kind: NodeKind, outcome: Upsert) {
        match (kind, outcome) {
            (NodeKind::Service, Upsert::Created) => self.services_created += 1,
            (NodeKind::Service, Upsert::Updated) => self.services_updated += 1,
            (NodeKind::Instance, Upsert::Created) => self.instances_created += 1,
            (NodeKind::Instance, Upsert::Updated) => self.instances_updated += 1,
            (_, Upsert::Unchanged) => {}
        }
    }

    /// Total nodes deleted by the prune pass
    pub fn pruned(&self) -> usize {
        self.instances_pruned + self.services_pruned
    }
}

pub struct Reconciler<'g, G: GraphStore> {
    graph: &'g mut G,
    dependency_tag: String,
}

impl<'g, G: GraphStore> Reconciler<'g, G> {
    pub fn new(graph: &'g mut G, dependency_tag: impl Into<String>) -> Self {
        Self {
            graph,
            dependency_tag: dependency_tag.into(),
        }
    }

    /// Full reconciliation: merge, then prune.
    pub fn reconcile(&mut self, snapshot: &Snapshot, stamp: &str) -> Result<ReconcileReport> {
        let mut report = self.merge(snapshot, stamp)?;
        self.prune(stamp, &mut report)?;
        Ok(report)
    }

    /// Upsert pass followed by the edge pass. Deletes nothing but stale edges.
    pub fn merge(&mut self, snapshot: &Snapshot, stamp: &str) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for service in &snapshot.services {
            self.merge_service(service, stamp, &mut report)?;
        }

        for service in &snapshot.services {
            self.link_dependency(service, &mut report)?;
        }

        Ok(report)
    }

    /// Delete every instance, then every service, whose stamp is not `stamp`.
    pub fn prune(&mut self, stamp: &str, report: &mut ReconcileReport) -> Result<()> {
        for kind in [NodeKind::Instance, NodeKind::Service] {
            for node in self.graph.nodes_of_kind(kind)? {
                if node.stamp == stamp {
                    continue;
                }
                tracing::info!(
                    node = %node.identifier(),
                    stamp = %node.stamp,
                    "obsolete, deleting"
                );
                if self.graph.delete_node(node.id)? {
                    match kind {
                        NodeKind::Instance => report.instances_pruned += 1,
                        NodeKind::Service => report.services_pruned += 1,
                    }
                }
            }
        }
        Ok(())
    }

    fn merge_service(
        &mut self,
        service: &ServiceRecord,
        stamp: &str,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let service_node = NodeRecord::service(service.name.as_str(), stamp);
        let service_id = service_node.id;
        let outcome = self.graph.upsert_node(service_node)?;
        report.record_upsert(NodeKind::Service, outcome);
        tracing::info!(service = %service.name, ?outcome, "service merged");

        for instance in &service.instances {
            let instance_node = NodeRecord::instance(instance.id.as_str(), stamp);
            let instance_id = instance_node.id;
            let outcome = self.graph.upsert_node(instance_node)?;
            report.record_upsert(NodeKind::Instance, outcome);

            if !graph::replace_outgoing(&mut *self.graph, instance_id, service_id, EdgeKind::RegisteredWith)? {
                return Err(GraphError::Unavailable(format!(
                    "service {} vanished while registering instance {}",
                    service.name, instance.id
                )));
            }
            tracing::debug!(
                instance = %instance.id,
                service = %service.name,
                ?outcome,
                "instance merged"
            );
        }
        Ok(())
    }

    /// Converge `service`'s `DEP_ON` edge to whatever its tag names now.
    fn link_dependency(&mut self, service: &ServiceRecord, report: &mut ReconcileReport) -> Result<()> {
        let source = compute_node_id(NodeKind::Service, &service.name);

        let Some(target_name) = service.tag_value(&self.dependency_tag) else {
            let removed = graph::clear_outgoing(&mut *self.graph, source, EdgeKind::DependsOn)?;
            if removed > 0 {
                tracing::info!(service = %service.name, removed, "dependency tag gone, edges dropped");
            }
            return Ok(());
        };

        tracing::info!(service = %service.name, target = target_name, "found dependency tag");
        match self.graph.get_node(NodeKind::Service, target_name)? {
            Some(target) => {
                graph::replace_outgoing(&mut *self.graph, source, target.id, EdgeKind::DependsOn)?;
                report.dependencies_linked += 1;
            }
            None => {
                tracing::warn!(
                    service = %service.name,
                    target = target_name,
                    "dependency target does not exist, skipping edge"
                );
                graph::clear_outgoing(&mut *self.graph, source, EdgeKind::DependsOn)?;
                report
                    .missing_targets
                    .push((service.name.clone(), target_name.to_string()));
            }
        }
        Ok(())
    }
}
