//! Error types for graph building.

use thiserror::Error;

use tgraph_core::GraphError;
use tgraph_critical::CriticalPathError;

/// Errors produced by trace readers and event requests.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A line of a JSON-lines trace could not be parsed.
    #[error("parse error on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Events handed to a reader were not sorted by timestamp.
    #[error("event {index} at {timestamp} is earlier than the previous event at {previous}")]
    OutOfOrder {
        index: usize,
        previous: i64,
        timestamp: i64,
    },

    /// The request was already handed to a reader.
    #[error("request already started")]
    AlreadyStarted,

    /// The reader went away without completing the request.
    #[error("request interrupted before completion")]
    Interrupted,
}

/// Errors produced by the [`GraphBuilder`](crate::builder::GraphBuilder).
#[derive(Debug, Error)]
pub enum BuildError {
    /// A build is in flight and the builder is configured to reject a new one.
    #[error("a graph build is already in progress")]
    AlreadyBuilding,

    /// The graph provider violated a graph invariant.
    #[error("graph provider error: {0}")]
    Provider(#[from] GraphError),

    #[error("trace error: {0}")]
    Trace(#[from] TraceError),

    /// No graph has been built yet.
    #[error("no graph has been built")]
    NoGraph,

    #[error(transparent)]
    CriticalPath(#[from] CriticalPathError),
}
