//! Core error types for tgraph-core.
//!
//! Every variant signals a graph invariant violated by the caller, which for
//! a graph provider means a bug in its event interpretation.

use crate::id::{VertexId, WorkerId};
use thiserror::Error;

/// Errors produced by [`ExecGraph`](crate::graph::ExecGraph) mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A vertex was appended at or before the worker's last timestamp.
    #[error("out of order append on worker {worker}: timestamp {timestamp} is not after {last}")]
    OutOfOrder {
        worker: WorkerId,
        last: i64,
        timestamp: i64,
    },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// A mutation was attempted on a frozen graph.
    #[error("graph is frozen")]
    FrozenGraph,

    /// A worker ID was not found in the graph.
    #[error("worker not found: WorkerId({id})", id = id.0)]
    WorkerNotFound { id: WorkerId },

    /// A vertex ID was not found in the graph.
    #[error("vertex not found: VertexId({id})", id = id.0)]
    VertexNotFound { id: VertexId },
}
