//! The graph provider contract and the shared graph handle.
//!
//! A [`GraphProvider`] turns the events of one analysis domain into
//! vertices and edges. The builder calls it from a single thread, in trace
//! order, so providers are the only writer of their target graph.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tgraph_core::{ExecGraph, GraphError};

use crate::event::TraceEvent;

/// A graph shared between its provider (the single writer) and readers.
///
/// Readers may look at the graph while it is being built; they see whatever
/// the provider has committed so far.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph(Arc<RwLock<ExecGraph>>);

impl SharedGraph {
    pub fn new() -> Self {
        SharedGraph::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ExecGraph> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ExecGraph> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn freeze(&self) {
        self.write().freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.read().is_frozen()
    }

    /// Copies the current state of the graph.
    pub fn snapshot(&self) -> ExecGraph {
        self.read().clone()
    }

    /// Returns `true` if both handles point at the same graph.
    pub fn ptr_eq(&self, other: &SharedGraph) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Builds an execution graph from trace events.
pub trait GraphProvider: Send {
    /// Binds the empty graph to fill. Called once, before any event.
    fn assign_target_graph(&mut self, graph: SharedGraph);

    /// Consumes one event. An error is a provider bug and stops the build.
    fn process_event(&mut self, event: &TraceEvent) -> Result<(), GraphError>;

    /// Called once when the stream is exhausted, to close open intervals.
    fn done(&mut self) -> Result<(), GraphError>;

    /// Called once if the stream is cancelled. The graph must be left
    /// consistent: every committed edge has both endpoints.
    fn handle_cancel(&mut self);
}

impl<P: GraphProvider + ?Sized> GraphProvider for Box<P> {
    fn assign_target_graph(&mut self, graph: SharedGraph) {
        (**self).assign_target_graph(graph)
    }

    fn process_event(&mut self, event: &TraceEvent) -> Result<(), GraphError> {
        (**self).process_event(event)
    }

    fn done(&mut self) -> Result<(), GraphError> {
        (**self).done()
    }

    fn handle_cancel(&mut self) {
        (**self).handle_cancel()
    }
}
