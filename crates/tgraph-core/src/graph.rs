//! ExecGraph: the execution graph container.
//!
//! [`ExecGraph`] owns every worker, vertex and edge produced while analysing
//! one trace. It is append-only while building and becomes read-only once
//! [`ExecGraph::freeze`] is called.
//!
//! # Layout
//!
//! - Vertices and edges live in a single petgraph `StableGraph`; the
//!   [`VertexId`] and [`EdgeId`] handles are its node and edge indices.
//! - Workers live in an `IndexMap` keyed by [`WorkerKey`]; a [`WorkerId`] is
//!   the worker's insertion index. Each worker keeps its own ordered list of
//!   vertices, so per-worker lookups never scan the whole graph.
//!
//! All mutations go through `ExecGraph` methods so that the time ordering
//! invariants hold: timelines are strictly increasing and no edge points
//! backward in time.

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::edge::{Edge, EdgeType};
use crate::error::GraphError;
use crate::id::{EdgeId, VertexId, WorkerId, WorkerKey};
use crate::vertex::{Vertex, Worker};

/// A resolved edge: its handle, endpoints and weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeView {
    pub id: EdgeId,
    pub source: VertexId,
    pub target: VertexId,
    pub edge: Edge,
}

impl EdgeView {
    pub fn edge_type(&self) -> EdgeType {
        self.edge.edge_type
    }
}

/// The execution graph of one trace analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecGraph {
    inner: StableGraph<Vertex, Edge, Directed, u32>,
    workers: IndexMap<WorkerKey, Worker>,
    frozen: bool,
}

impl ExecGraph {
    /// Creates an empty, mutable graph.
    pub fn new() -> Self {
        ExecGraph::default()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Returns the worker for `key`, creating it on first use.
    ///
    /// Looking up a known key is always allowed; creating a new worker on a
    /// frozen graph fails with [`GraphError::FrozenGraph`].
    pub fn create_worker(&mut self, key: impl Into<WorkerKey>) -> Result<WorkerId, GraphError> {
        let key = key.into();
        if let Some(index) = self.workers.get_index_of(&key) {
            return Ok(WorkerId(index as u32));
        }
        self.ensure_mutable()?;

        let id = WorkerId(self.workers.len() as u32);
        self.workers.insert(key.clone(), Worker::new(id, key));
        Ok(id)
    }

    /// Appends a vertex at `timestamp` to the end of `worker`'s timeline.
    ///
    /// The timestamp must be strictly greater than the timeline's last one;
    /// otherwise the graph is left unchanged and [`GraphError::OutOfOrder`] is
    /// returned.
    pub fn append(&mut self, worker: WorkerId, timestamp: i64) -> Result<VertexId, GraphError> {
        self.ensure_mutable()?;
        let timeline = self
            .workers
            .get_index_mut(worker.0 as usize)
            .map(|(_, w)| w)
            .ok_or(GraphError::WorkerNotFound { id: worker })?;

        if let Some(last) = timeline.last_timestamp() {
            if timestamp <= last {
                return Err(GraphError::OutOfOrder {
                    worker,
                    last,
                    timestamp,
                });
            }
        }

        let vertex = VertexId::from(self.inner.add_node(Vertex { timestamp, worker }));
        timeline.push(vertex, timestamp);

        #[cfg(debug_assertions)]
        self.assert_tail_order(worker);

        Ok(vertex)
    }

    /// Appends a vertex and links the previous tail of the timeline to it.
    ///
    /// Returns the new vertex and, unless the timeline was empty, the new
    /// horizontal edge.
    pub fn append_linked(
        &mut self,
        worker: WorkerId,
        timestamp: i64,
        edge_type: EdgeType,
    ) -> Result<(VertexId, Option<EdgeId>), GraphError> {
        let previous = self.tail(worker);
        let vertex = self.append(worker, timestamp)?;
        let edge = match previous {
            Some(prev) => Some(self.connect(prev, vertex, edge_type)?),
            None => None,
        };
        Ok((vertex, edge))
    }

    /// Connects `source` to `target` with a typed edge.
    ///
    /// Fails with [`GraphError::InvalidEdge`] if either vertex is unknown or
    /// if the edge would point backward in time.
    pub fn connect(
        &mut self,
        source: VertexId,
        target: VertexId,
        edge_type: EdgeType,
    ) -> Result<EdgeId, GraphError> {
        self.ensure_mutable()?;
        let from = self.vertex(source).ok_or_else(|| GraphError::InvalidEdge {
            reason: format!("unknown source vertex {}", source),
        })?;
        let to = self.vertex(target).ok_or_else(|| GraphError::InvalidEdge {
            reason: format!("unknown target vertex {}", target),
        })?;
        if to.timestamp < from.timestamp {
            return Err(GraphError::InvalidEdge {
                reason: format!(
                    "edge {} -> {} goes backward in time ({} > {})",
                    source, target, from.timestamp, to.timestamp
                ),
            });
        }

        let duration = to
            .timestamp
            .checked_sub(from.timestamp)
            .ok_or_else(|| GraphError::InvalidEdge {
                reason: format!(
                    "edge {} -> {} spans more than i64::MAX ({} to {})",
                    source, target, from.timestamp, to.timestamp
                ),
            })?;
        let edge = Edge::new(edge_type, duration);
        let idx = self.inner.add_edge(source.into(), target.into(), edge);
        Ok(EdgeId::from(idx))
    }

    /// Makes the graph read-only. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<(), GraphError> {
        if self.frozen {
            Err(GraphError::FrozenGraph)
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Worker queries
    // -----------------------------------------------------------------------

    /// Looks up a worker ID by key.
    pub fn worker_id(&self, key: &WorkerKey) -> Option<WorkerId> {
        self.workers
            .get_index_of(key)
            .map(|index| WorkerId(index as u32))
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get_index(id.0 as usize).map(|(_, w)| w)
    }

    /// Iterates over workers in creation order.
    pub fn workers(&self) -> impl Iterator<Item = &Worker> + '_ {
        self.workers.values()
    }

    /// Returns the worker's vertices in timeline order (empty if unknown).
    pub fn vertices_of(&self, worker: WorkerId) -> &[VertexId] {
        self.worker(worker).map_or(&[], |w| w.vertices())
    }

    pub fn head(&self, worker: WorkerId) -> Option<VertexId> {
        self.worker(worker).and_then(Worker::head)
    }

    pub fn tail(&self, worker: WorkerId) -> Option<VertexId> {
        self.worker(worker).and_then(Worker::tail)
    }

    /// Returns the vertex of `worker` active at `timestamp`: the last vertex
    /// whose timestamp is `<= timestamp`.
    pub fn vertex_at(&self, worker: WorkerId, timestamp: i64) -> Option<VertexId> {
        let w = self.worker(worker)?;
        w.position_at(timestamp).map(|pos| w.vertices()[pos])
    }

    // -----------------------------------------------------------------------
    // Vertex and edge queries
    // -----------------------------------------------------------------------

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.inner.node_weight(id.into())
    }

    /// Returns the key of the worker owning `vertex`.
    pub fn worker_key_of(&self, vertex: VertexId) -> Option<&WorkerKey> {
        let v = self.vertex(vertex)?;
        self.worker(v.worker).map(|w| &w.key)
    }

    pub fn edge(&self, id: EdgeId) -> Option<EdgeView> {
        let idx = id.into();
        let (source, target) = self.inner.edge_endpoints(idx)?;
        let edge = *self.inner.edge_weight(idx)?;
        Some(EdgeView {
            id,
            source: source.into(),
            target: target.into(),
            edge,
        })
    }

    /// Edges leaving `vertex`.
    pub fn outgoing(&self, vertex: VertexId) -> impl Iterator<Item = EdgeView> + '_ {
        self.edges_directed(vertex, Direction::Outgoing)
    }

    /// Edges arriving at `vertex`.
    pub fn incoming(&self, vertex: VertexId) -> impl Iterator<Item = EdgeView> + '_ {
        self.edges_directed(vertex, Direction::Incoming)
    }

    fn edges_directed(
        &self,
        vertex: VertexId,
        direction: Direction,
    ) -> impl Iterator<Item = EdgeView> + '_ {
        let idx: NodeIndex<u32> = vertex.into();
        self.inner
            .edges_directed(idx, direction)
            .map(|e| EdgeView {
                id: e.id().into(),
                source: e.source().into(),
                target: e.target().into(),
                edge: *e.weight(),
            })
    }

    /// Iterates over every edge of the graph.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView> + '_ {
        self.inner.edge_references().map(|e| EdgeView {
            id: e.id().into(),
            source: e.source().into(),
            target: e.target().into(),
            edge: *e.weight(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Earliest and latest vertex timestamps over all workers.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let mut range: Option<(i64, i64)> = None;
        for worker in self.workers.values() {
            let (Some(head), Some(tail)) = (worker.head(), worker.tail()) else {
                continue;
            };
            let start = self.inner[NodeIndex::from(head)].timestamp;
            let end = self.inner[NodeIndex::from(tail)].timestamp;
            range = Some(match range {
                None => (start, end),
                Some((lo, hi)) => (lo.min(start), hi.max(end)),
            });
        }
        range
    }

    // -----------------------------------------------------------------------
    // Debug consistency assertion
    // -----------------------------------------------------------------------

    /// Checks the vertex just appended to `worker` against the one before it.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`). Constant
    /// time, so it is safe on the append path.
    #[cfg(debug_assertions)]
    fn assert_tail_order(&self, worker: WorkerId) {
        let Some(w) = self.worker(worker) else {
            panic!("worker {:?} vanished", worker);
        };
        let tail = w.vertices().iter().rev().take(2);
        let mut later: Option<Vertex> = None;
        for &v in tail {
            let vertex = self.inner[NodeIndex::from(v)];
            assert_eq!(vertex.worker, worker, "vertex {:?} owned by wrong worker", v);
            if let Some(later) = later {
                assert!(
                    later.timestamp > vertex.timestamp,
                    "worker {:?} timeline not increasing at {:?}",
                    worker,
                    v
                );
            }
            later = Some(vertex);
        }
    }

    /// Walks every timeline and panics if a vertex is owned by the wrong
    /// worker or a timeline is not strictly increasing.
    ///
    /// Linear in the size of the graph; meant for tests and explicit checks,
    /// not for the append path.
    pub fn assert_consistency(&self) {
        for w in self.workers.values() {
            let mut previous: Option<i64> = None;
            for &v in w.vertices() {
                let vertex = self.inner[NodeIndex::from(v)];
                assert_eq!(vertex.worker, w.id, "vertex {:?} owned by wrong worker", v);
                if let Some(prev) = previous {
                    assert!(
                        vertex.timestamp > prev,
                        "worker {:?} timeline not increasing at {:?}",
                        w.id,
                        v
                    );
                }
                previous = Some(vertex.timestamp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(graph: &ExecGraph, worker: WorkerId) -> Vec<i64> {
        graph
            .vertices_of(worker)
            .iter()
            .map(|&v| graph.vertex(v).unwrap().timestamp)
            .collect()
    }

    #[test]
    fn create_worker_is_idempotent() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("tid/1").unwrap();
        let b = graph.create_worker("tid/2").unwrap();
        assert_ne!(a, b);
        assert_eq!(graph.create_worker("tid/1").unwrap(), a);
        assert_eq!(graph.worker_count(), 2);
        assert_eq!(graph.worker_id(&WorkerKey::from("tid/2")), Some(b));
    }

    #[test]
    fn append_builds_ordered_timeline() {
        let mut graph = ExecGraph::new();
        let w = graph.create_worker("w").unwrap();
        let v0 = graph.append(w, 0).unwrap();
        let v1 = graph.append(w, 10).unwrap();
        let v2 = graph.append(w, 20).unwrap();

        assert_eq!(graph.vertices_of(w), &[v0, v1, v2]);
        assert_eq!(timestamps(&graph, w), vec![0, 10, 20]);
        assert_eq!(graph.head(w), Some(v0));
        assert_eq!(graph.tail(w), Some(v2));
        assert_eq!(graph.vertex(v1).unwrap().worker, w);
    }

    #[test]
    fn append_rejects_equal_or_earlier_timestamps() {
        let mut graph = ExecGraph::new();
        let w = graph.create_worker("w").unwrap();
        graph.append(w, 10).unwrap();

        let err = graph.append(w, 10).unwrap_err();
        assert_eq!(
            err,
            GraphError::OutOfOrder {
                worker: w,
                last: 10,
                timestamp: 10
            }
        );
        assert!(matches!(
            graph.append(w, 5),
            Err(GraphError::OutOfOrder { .. })
        ));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn append_to_unknown_worker_errors() {
        let mut graph = ExecGraph::new();
        match graph.append(WorkerId(3), 0) {
            Err(GraphError::WorkerNotFound { id }) => assert_eq!(id, WorkerId(3)),
            other => panic!("expected WorkerNotFound, got {:?}", other),
        }
    }

    #[test]
    fn workers_have_independent_clocks() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        graph.append(a, 100).unwrap();
        graph.append(b, 5).unwrap();
        graph.append(a, 101).unwrap();
        assert_eq!(timestamps(&graph, a), vec![100, 101]);
        assert_eq!(timestamps(&graph, b), vec![5]);
    }

    #[test]
    fn connect_computes_duration() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        let a0 = graph.append(a, 10).unwrap();
        let b0 = graph.append(b, 25).unwrap();

        let e = graph.connect(a0, b0, EdgeType::Blocked).unwrap();
        let view = graph.edge(e).unwrap();
        assert_eq!(view.source, a0);
        assert_eq!(view.target, b0);
        assert_eq!(view.edge, Edge::new(EdgeType::Blocked, 15));

        assert_eq!(graph.outgoing(a0).collect::<Vec<_>>(), vec![view]);
        assert_eq!(graph.incoming(b0).collect::<Vec<_>>(), vec![view]);
        assert_eq!(graph.incoming(a0).count(), 0);
    }

    #[test]
    fn connect_allows_equal_timestamps_across_workers() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        let a0 = graph.append(a, 10).unwrap();
        let b0 = graph.append(b, 10).unwrap();
        let e = graph.connect(a0, b0, EdgeType::Default).unwrap();
        assert_eq!(graph.edge(e).unwrap().edge.duration, 0);
    }

    #[test]
    fn connect_rejects_backward_edges() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        let a0 = graph.append(a, 30).unwrap();
        let b0 = graph.append(b, 20).unwrap();

        assert!(matches!(
            graph.connect(a0, b0, EdgeType::Running),
            Err(GraphError::InvalidEdge { .. })
        ));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn connect_rejects_unknown_vertices() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let a0 = graph.append(a, 0).unwrap();
        assert!(matches!(
            graph.connect(a0, VertexId(99), EdgeType::Running),
            Err(GraphError::InvalidEdge { .. })
        ));
        assert!(matches!(
            graph.connect(VertexId(99), a0, EdgeType::Running),
            Err(GraphError::InvalidEdge { .. })
        ));
    }

    #[test]
    fn append_linked_connects_previous_tail() {
        let mut graph = ExecGraph::new();
        let w = graph.create_worker("w").unwrap();
        let (v0, e0) = graph.append_linked(w, 0, EdgeType::Running).unwrap();
        assert!(e0.is_none());
        let (v1, e1) = graph.append_linked(w, 7, EdgeType::Preempted).unwrap();

        let edge = graph.edge(e1.unwrap()).unwrap();
        assert_eq!((edge.source, edge.target), (v0, v1));
        assert_eq!(edge.edge, Edge::new(EdgeType::Preempted, 7));
    }

    #[test]
    fn vertex_at_uses_timeline() {
        let mut graph = ExecGraph::new();
        let w = graph.create_worker("w").unwrap();
        let v0 = graph.append(w, 0).unwrap();
        let v1 = graph.append(w, 10).unwrap();

        assert_eq!(graph.vertex_at(w, -5), None);
        assert_eq!(graph.vertex_at(w, 0), Some(v0));
        assert_eq!(graph.vertex_at(w, 9), Some(v0));
        assert_eq!(graph.vertex_at(w, 10), Some(v1));
        assert_eq!(graph.vertex_at(WorkerId(8), 10), None);
    }

    #[test]
    fn frozen_graph_rejects_mutation() {
        let mut graph = ExecGraph::new();
        let w = graph.create_worker("w").unwrap();
        let v0 = graph.append(w, 0).unwrap();
        let v1 = graph.append(w, 1).unwrap();
        graph.freeze();
        assert!(graph.is_frozen());

        assert_eq!(graph.append(w, 2), Err(GraphError::FrozenGraph));
        assert_eq!(
            graph.connect(v0, v1, EdgeType::Running),
            Err(GraphError::FrozenGraph)
        );
        assert_eq!(graph.create_worker("new"), Err(GraphError::FrozenGraph));
        assert_eq!(
            graph.append_linked(w, 3, EdgeType::Running),
            Err(GraphError::FrozenGraph)
        );

        // Known keys still resolve.
        assert_eq!(graph.create_worker("w"), Ok(w));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn time_range_spans_all_workers() {
        let mut graph = ExecGraph::new();
        assert_eq!(graph.time_range(), None);
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        graph.create_worker("empty").unwrap();
        graph.append(a, 5).unwrap();
        graph.append(a, 40).unwrap();
        graph.append(b, 2).unwrap();
        assert_eq!(graph.time_range(), Some((2, 40)));
    }

    #[test]
    fn serde_roundtrip_preserves_timelines() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        let a0 = graph.append(a, 0).unwrap();
        let a1 = graph.append(a, 10).unwrap();
        let b0 = graph.append(b, 5).unwrap();
        graph.connect(a0, a1, EdgeType::Running).unwrap();
        graph.connect(a0, b0, EdgeType::Default).unwrap();
        graph.freeze();

        let json = serde_json::to_string(&graph).unwrap();
        let back: ExecGraph = serde_json::from_str(&json).unwrap();

        assert!(back.is_frozen());
        assert_eq!(back.node_count(), 3);
        assert_eq!(back.edge_count(), 2);
        assert_eq!(back.vertices_of(a), &[a0, a1]);
        assert_eq!(back.worker_id(&WorkerKey::from("b")), Some(b));
        assert_eq!(back.incoming(b0).count(), 1);
    }

    #[test]
    fn connect_rejects_span_wider_than_i64() {
        let mut graph = ExecGraph::new();
        let a = graph.create_worker("a").unwrap();
        let b = graph.create_worker("b").unwrap();
        let early = graph.append(a, -5_000_000_000_000_000_000).unwrap();
        let late = graph.append(b, 5_000_000_000_000_000_000).unwrap();

        assert!(matches!(
            graph.connect(early, late, EdgeType::Running),
            Err(GraphError::InvalidEdge { .. })
        ));
        assert_eq!(graph.edge_count(), 0);

        let near = graph.append(b, i64::MAX).unwrap();
        let edge = graph.connect(late, near, EdgeType::Running).unwrap();
        assert_eq!(
            graph.edge(edge).unwrap().edge.duration,
            i64::MAX - 5_000_000_000_000_000_000
        );
    }

    #[test]
    fn long_timeline_stays_consistent() {
        let mut graph = ExecGraph::new();
        let w = graph.create_worker("w").unwrap();
        for t in 0..50_000 {
            graph.append_linked(w, t, EdgeType::Running).unwrap();
        }
        graph.assert_consistency();
        assert_eq!(graph.vertices_of(w).len(), 50_000);
        assert_eq!(graph.edges().count(), 49_999);
        assert!(graph.edges().all(|e| e.edge.duration == 1));
    }
}
