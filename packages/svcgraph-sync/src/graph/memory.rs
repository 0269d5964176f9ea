//! MemoryGraph - in-memory `GraphStore` with optional JSON persistence.
//!
//! Ephemeral graphs never touch disk. File-backed graphs load their image
//! on `open()` or `reload()` and rewrite it atomically (temp file + rename)
//! on `flush()`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{GraphStore, Result, Upsert};
use crate::error::GraphError;
use crate::storage::{EdgeKind, EdgeRecord, NodeKind, NodeRecord, compute_node_id};

/// On-disk format version.
const IMAGE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct GraphImage {
    version: u32,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: HashMap<u128, NodeRecord>,
    /// Ordered by (src, dst, kind) so outgoing edges are a range scan
    edges: BTreeSet<EdgeRecord>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl MemoryGraph {
    pub fn create_ephemeral() -> Self {
        Self::default()
    }

    /// File-backed graph that has not read its image yet. Nothing is
    /// loaded until `reload()`, so the image can be read under a lock.
    pub fn bind(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Open a file-backed graph. A missing file is an empty graph.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut graph = Self::bind(path);
        graph.reload()?;
        Ok(graph)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.path.is_none()
    }

    fn outgoing_range(&self, src: u128) -> impl Iterator<Item = &EdgeRecord> {
        let lo = EdgeRecord::new(src, 0, EdgeKind::DependsOn);
        let hi = EdgeRecord::new(src, u128::MAX, EdgeKind::RegisteredWith);
        self.edges.range(lo..=hi)
    }

    fn write_image(&self, path: &Path) -> Result<()> {
        let mut nodes: Vec<NodeRecord> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        let image = GraphImage {
            version: IMAGE_VERSION,
            nodes,
            edges: self.edges.iter().copied().collect(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&image)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

type Contents = (HashMap<u128, NodeRecord>, BTreeSet<EdgeRecord>);

fn load_image(path: &Path) -> Result<Contents> {
    let mut nodes = HashMap::new();
    let mut edges = BTreeSet::new();

    if !path.exists() {
        tracing::info!(path = %path.display(), "graph image not found, starting empty");
        return Ok((nodes, edges));
    }

    let bytes = fs::read(path)?;
    let image: GraphImage = serde_json::from_slice(&bytes)?;
    if image.version != IMAGE_VERSION {
        return Err(GraphError::InvalidFormat(format!(
            "unsupported image version {} (expected {})",
            image.version, IMAGE_VERSION
        )));
    }

    for node in image.nodes {
        if node.id != compute_node_id(node.kind, &node.name) {
            return Err(GraphError::InvalidFormat(format!(
                "node {} has mismatched id",
                node.identifier()
            )));
        }
        nodes.insert(node.id, node);
    }
    for edge in image.edges {
        if !nodes.contains_key(&edge.src) || !nodes.contains_key(&edge.dst) {
            return Err(GraphError::InvalidFormat(format!(
                "dangling {} edge {} -> {}",
                edge.kind.as_str(),
                edge.src,
                edge.dst
            )));
        }
        edges.insert(edge);
    }

    tracing::info!(
        path = %path.display(),
        nodes = nodes.len(),
        edges = edges.len(),
        "graph image loaded"
    );
    Ok((nodes, edges))
}

impl GraphStore for MemoryGraph {
    fn get_node(&self, kind: NodeKind, name: &str) -> Result<Option<NodeRecord>> {
        Ok(self.nodes.get(&compute_node_id(kind, name)).cloned())
    }

    fn upsert_node(&mut self, node: NodeRecord) -> Result<Upsert> {
        let outcome = match self.nodes.get_mut(&node.id) {
            None => {
                self.nodes.insert(node.id, node);
                Upsert::Created
            }
            Some(existing) if existing.stamp == node.stamp => Upsert::Unchanged,
            Some(existing) => {
                existing.stamp = node.stamp;
                Upsert::Updated
            }
        };
        if outcome != Upsert::Unchanged {
            self.dirty = true;
        }
        Ok(outcome)
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<NodeRecord>> {
        let mut nodes: Vec<NodeRecord> = self
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    fn delete_node(&mut self, id: u128) -> Result<bool> {
        if self.nodes.remove(&id).is_none() {
            return Ok(false);
        }
        self.edges.retain(|e| e.src != id && e.dst != id);
        self.dirty = true;
        Ok(true)
    }

    fn add_edge(&mut self, edge: EdgeRecord) -> Result<bool> {
        if !self.nodes.contains_key(&edge.src) || !self.nodes.contains_key(&edge.dst) {
            return Ok(false);
        }
        if self.edges.insert(edge) {
            self.dirty = true;
        }
        Ok(true)
    }

    fn delete_edge(&mut self, edge: EdgeRecord) -> Result<bool> {
        let removed = self.edges.remove(&edge);
        if removed {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn outgoing_edges(&self, src: u128, kind: EdgeKind) -> Result<Vec<EdgeRecord>> {
        Ok(self
            .outgoing_range(src)
            .filter(|e| e.kind == kind)
            .copied()
            .collect())
    }

    fn incoming_edges(&self, dst: u128, kind: EdgeKind) -> Result<Vec<EdgeRecord>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.dst == dst && e.kind == kind)
            .copied()
            .collect())
    }

    fn reload(&mut self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let (nodes, edges) = load_image(path)?;
        self.nodes = nodes;
        self.edges = edges;
        self.dirty = false;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty && path.exists() {
            return Ok(());
        }
        self.write_image(&path)?;
        self.dirty = false;
        tracing::debug!(path = %path.display(), "graph image flushed");
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
