//! The critical path result.
//!
//! A [`CriticalPath`] owns a reduced [`ExecGraph`] holding only the path's
//! vertices and edges, plus the path in traversal order. It shares nothing
//! with the graph it was computed from.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use tgraph_core::{EdgeType, ExecGraph, GraphError, WorkerKey};

/// A point of the path, named by worker key so it stays meaningful without
/// the source graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathVertex {
    pub worker: WorkerKey,
    pub timestamp: i64,
}

/// One step of the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEdge {
    pub source: PathVertex,
    pub target: PathVertex,
    pub edge_type: EdgeType,
    pub duration: i64,
}

/// An immutable critical path, ordered from its first vertex to its last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPath {
    first: PathVertex,
    edges: Vec<PathEdge>,
    graph: ExecGraph,
}

impl CriticalPath {
    /// Builds the path and its reduced graph from steps in forward order.
    pub(crate) fn from_steps(first: PathVertex, edges: Vec<PathEdge>) -> Result<Self, GraphError> {
        let mut graph = ExecGraph::new();
        let worker = graph.create_worker(first.worker.clone())?;
        let mut previous = graph.append(worker, first.timestamp)?;
        for step in &edges {
            let worker = graph.create_worker(step.target.worker.clone())?;
            let next = graph.append(worker, step.target.timestamp)?;
            graph.connect(previous, next, step.edge_type)?;
            previous = next;
        }
        graph.freeze();

        Ok(CriticalPath {
            first,
            edges,
            graph,
        })
    }

    /// The first vertex of the path.
    pub fn start(&self) -> &PathVertex {
        &self.first
    }

    /// The last vertex of the path.
    pub fn end(&self) -> &PathVertex {
        self.edges.last().map_or(&self.first, |e| &e.target)
    }

    pub fn edges(&self) -> &[PathEdge] {
        &self.edges
    }

    /// Every vertex of the path, in order.
    pub fn vertices(&self) -> Vec<&PathVertex> {
        std::iter::once(&self.first)
            .chain(self.edges.iter().map(|e| &e.target))
            .collect()
    }

    /// The reduced, frozen graph holding only the path.
    pub fn graph(&self) -> &ExecGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Elapsed time from the first to the last vertex, saturating at
    /// `i64::MAX`.
    pub fn duration(&self) -> i64 {
        self.end().timestamp.saturating_sub(self.first.timestamp)
    }

    /// Total time spent in each edge type along the path.
    pub fn breakdown(&self) -> BTreeMap<EdgeType, i64> {
        let mut totals = BTreeMap::new();
        for edge in &self.edges {
            let total = totals.entry(edge.edge_type).or_insert(0i64);
            *total = total.saturating_add(edge.duration);
        }
        totals
    }

    /// Workers the path goes through, in order of first visit.
    pub fn workers(&self) -> Vec<&WorkerKey> {
        let seen: IndexSet<&WorkerKey> = self.vertices().into_iter().map(|v| &v.worker).collect();
        seen.into_iter().collect()
    }
}
