//! Stable ID newtypes for execution graph entities.
//!
//! All IDs are distinct newtype wrappers over `u32` indexing into the graph's
//! arenas, so a `VertexId` cannot be accidentally used where an `EdgeId` is
//! expected and no entity holds a reference to another.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Stable vertex identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

/// Stable edge identifier. Maps to a petgraph `EdgeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Worker identity within one execution graph, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

/// Stable external key of an execution context, e.g. `tid/42`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerKey(pub String);

impl WorkerKey {
    pub fn new(key: impl Into<String>) -> Self {
        WorkerKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerKey {
    fn from(key: &str) -> Self {
        WorkerKey(key.to_string())
    }
}

impl From<String> for WorkerKey {
    fn from(key: String) -> Self {
        WorkerKey(key)
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Bridge between our IDs and petgraph's indices.

impl From<NodeIndex<u32>> for VertexId {
    fn from(idx: NodeIndex<u32>) -> Self {
        VertexId(idx.index() as u32)
    }
}

impl From<VertexId> for NodeIndex<u32> {
    fn from(id: VertexId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

impl From<EdgeIndex<u32>> for EdgeId {
    fn from(idx: EdgeIndex<u32>) -> Self {
        EdgeId(idx.index() as u32)
    }
}

impl From<EdgeId> for EdgeIndex<u32> {
    fn from(id: EdgeId) -> Self {
        EdgeIndex::new(id.0 as usize)
    }
}
