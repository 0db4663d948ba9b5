//! Critical path error types.

use thiserror::Error;

use tgraph_core::{GraphError, VertexId, WorkerKey};

use crate::path::CriticalPath;

/// Errors produced while computing a critical path.
#[derive(Debug, Error)]
pub enum CriticalPathError {
    /// The traversal needs a read-only graph.
    #[error("graph is still being built")]
    GraphNotFrozen,

    #[error("vertex not found: VertexId({id})", id = id.0)]
    VertexNotFound { id: VertexId },

    #[error("worker not found: {key}")]
    WorkerNotFound { key: WorkerKey },

    #[error("worker {key} has no vertices")]
    EmptyWorker { key: WorkerKey },

    /// The end vertex lies before the start vertex.
    #[error("end vertex at {end} is before start vertex at {start}")]
    InvalidRange { start: i64, end: i64 },

    /// No qualifying incoming edge was found before reaching the start vertex.
    ///
    /// `partial` holds the path from `reached` to the requested end.
    #[error("path is disconnected: stopped at vertex {reached} before reaching the start")]
    DisconnectedPath {
        reached: VertexId,
        partial: Box<CriticalPath>,
    },

    /// Building the result graph failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
