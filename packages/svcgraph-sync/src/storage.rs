//! Graph records

use serde::{Deserialize, Serialize};

/// Node type. Base types are UPPERCASE, as in the graph image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Service,
    Instance,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Service => "SERVICE",
            NodeKind::Instance => "INSTANCE",
        }
    }
}

/// Edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Service → service it depends on
    #[serde(rename = "DEP_ON")]
    DependsOn,
    /// Instance → owning service
    #[serde(rename = "REGISTERED")]
    RegisteredWith,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::DependsOn => "DEP_ON",
            EdgeKind::RegisteredWith => "REGISTERED",
        }
    }
}

/// Deterministic node ID: first 16 bytes of BLAKE3 over `KIND:name`.
///
/// (kind, name) is the unique key, so the ID is stable across runs and
/// across processes sharing the same graph image.
pub fn compute_node_id(kind: NodeKind, name: &str) -> u128 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[0..16]);
    u128::from_le_bytes(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u128,
    pub kind: NodeKind,
    pub name: String,
    /// Transaction that last confirmed this node exists
    pub stamp: String,
}

impl NodeRecord {
    pub fn new(kind: NodeKind, name: impl Into<String>, stamp: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: compute_node_id(kind, &name),
            kind,
            name,
            stamp: stamp.into(),
        }
    }

    pub fn service(name: impl Into<String>, stamp: impl Into<String>) -> Self {
        Self::new(NodeKind::Service, name, stamp)
    }

    pub fn instance(name: impl Into<String>, stamp: impl Into<String>) -> Self {
        Self::new(NodeKind::Instance, name, stamp)
    }

    /// Readable identifier (`KIND:name`)
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: u128,
    pub dst: u128,
    pub kind: EdgeKind,
}

impl EdgeRecord {
    pub fn new(src: u128, dst: u128, kind: EdgeKind) -> Self {
        Self { src, dst, kind }
    }
}
