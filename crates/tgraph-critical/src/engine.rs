//! Backward greedy critical path traversal.
//!
//! Starting at the end vertex, the engine repeatedly follows one incoming
//! edge back in time until it reaches the start vertex. At each vertex the
//! candidate edges are ranked by:
//!
//! 1. the [`PriorityPolicy`] rank of the edge type (lower wins);
//! 2. the latest source timestamp;
//! 3. the highest edge ID, i.e. the most recently connected edge.
//!
//! Only edges whose source is not earlier than the start vertex qualify,
//! since nothing before the start can lead back to it. Each step only looks
//! at the current vertex's incoming edges, so the cost is proportional to
//! the path length times the average in-degree.

use std::cmp::Reverse;
use std::collections::HashSet;

use tgraph_core::{EdgeView, ExecGraph, Vertex, VertexId, WorkerKey};

use crate::error::CriticalPathError;
use crate::path::{CriticalPath, PathEdge, PathVertex};
use crate::policy::PriorityPolicy;

/// Computes critical paths over frozen graphs with a fixed policy.
#[derive(Debug, Clone, Default)]
pub struct CriticalPathEngine {
    policy: PriorityPolicy,
}

impl CriticalPathEngine {
    pub fn new(policy: PriorityPolicy) -> Self {
        CriticalPathEngine { policy }
    }

    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    /// Critical path over a worker's whole timeline, head to tail.
    pub fn compute_for_worker(
        &self,
        graph: &ExecGraph,
        key: &WorkerKey,
    ) -> Result<CriticalPath, CriticalPathError> {
        let worker = graph
            .worker_id(key)
            .ok_or_else(|| CriticalPathError::WorkerNotFound { key: key.clone() })?;
        let (Some(head), Some(tail)) = (graph.head(worker), graph.tail(worker)) else {
            return Err(CriticalPathError::EmptyWorker { key: key.clone() });
        };
        self.compute(graph, head, Some(tail))
    }

    /// Critical path from `start` to `end`.
    ///
    /// `end` defaults to the last vertex of the start vertex's worker. If the
    /// traversal cannot get back to `start`, the error carries the partial
    /// path from the vertex where it stopped.
    pub fn compute(
        &self,
        graph: &ExecGraph,
        start: VertexId,
        end: Option<VertexId>,
    ) -> Result<CriticalPath, CriticalPathError> {
        if !graph.is_frozen() {
            return Err(CriticalPathError::GraphNotFrozen);
        }
        let start_vertex = lookup(graph, start)?;
        let end = match end {
            Some(end) => end,
            None => graph
                .tail(start_vertex.worker)
                .ok_or(CriticalPathError::VertexNotFound { id: start })?,
        };
        let end_vertex = lookup(graph, end)?;
        if end_vertex.timestamp < start_vertex.timestamp {
            return Err(CriticalPathError::InvalidRange {
                start: start_vertex.timestamp,
                end: end_vertex.timestamp,
            });
        }

        // Zero-duration edges between workers can form cycles at a single
        // timestamp; never revisit a vertex.
        let mut visited = HashSet::from([end]);
        let mut steps: Vec<EdgeView> = Vec::new();
        let mut current = end;

        while current != start {
            let chosen = graph
                .incoming(current)
                .filter_map(|e| {
                    let rank = self.policy.rank(e.edge_type())?;
                    let source = graph.vertex(e.source)?;
                    if source.timestamp < start_vertex.timestamp || visited.contains(&e.source) {
                        return None;
                    }
                    Some((e, rank, source.timestamp))
                })
                .min_by_key(|&(e, rank, source_ts)| (rank, Reverse(source_ts), Reverse(e.id)));

            let Some((edge, _, _)) = chosen else {
                tracing::debug!(
                    reached = %current,
                    start = %start,
                    steps = steps.len(),
                    "critical path is disconnected"
                );
                let partial = assemble(graph, current, &steps)?;
                return Err(CriticalPathError::DisconnectedPath {
                    reached: current,
                    partial: Box::new(partial),
                });
            };

            steps.push(edge);
            visited.insert(edge.source);
            current = edge.source;
        }

        let path = assemble(graph, start, &steps)?;
        tracing::debug!(
            start = %start,
            end = %end,
            steps = path.len(),
            duration = path.duration(),
            "critical path computed"
        );
        Ok(path)
    }
}

fn lookup(graph: &ExecGraph, id: VertexId) -> Result<Vertex, CriticalPathError> {
    graph
        .vertex(id)
        .copied()
        .ok_or(CriticalPathError::VertexNotFound { id })
}

fn path_vertex(graph: &ExecGraph, id: VertexId) -> Result<PathVertex, CriticalPathError> {
    let vertex = lookup(graph, id)?;
    let worker = graph
        .worker_key_of(id)
        .cloned()
        .ok_or(CriticalPathError::VertexNotFound { id })?;
    Ok(PathVertex {
        worker,
        timestamp: vertex.timestamp,
    })
}

/// Turns backward steps into a forward path starting at `first`.
fn assemble(
    graph: &ExecGraph,
    first: VertexId,
    backward: &[EdgeView],
) -> Result<CriticalPath, CriticalPathError> {
    let edges = backward
        .iter()
        .rev()
        .map(|e| {
            Ok(PathEdge {
                source: path_vertex(graph, e.source)?,
                target: path_vertex(graph, e.target)?,
                edge_type: e.edge_type(),
                duration: e.edge.duration,
            })
        })
        .collect::<Result<Vec<_>, CriticalPathError>>()?;
    Ok(CriticalPath::from_steps(path_vertex(graph, first)?, edges)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgraph_core::EdgeType;

    fn timestamps(path: &CriticalPath) -> Vec<i64> {
        path.vertices().iter().map(|v| v.timestamp).collect()
    }

    fn linked_worker(graph: &mut ExecGraph, key: &str, ts: &[i64]) -> Vec<VertexId> {
        let w = graph.create_worker(key).unwrap();
        ts.iter()
            .map(|&t| graph.append_linked(w, t, EdgeType::Running).unwrap().0)
            .collect()
    }

    #[test]
    fn single_worker_returns_full_timeline() {
        let mut graph = ExecGraph::new();
        linked_worker(&mut graph, "main", &[0, 3, 9, 12, 40]);
        graph.freeze();

        let path = CriticalPathEngine::default()
            .compute_for_worker(&graph, &WorkerKey::from("main"))
            .unwrap();
        assert_eq!(timestamps(&path), vec![0, 3, 9, 12, 40]);
        assert!(path.edges().iter().all(|e| e.edge_type == EdgeType::Running));
    }

    #[test]
    fn running_edges_win_over_blocked_diversion() {
        let mut graph = ExecGraph::new();
        let w = linked_worker(&mut graph, "W", &[0, 10, 20, 30]);
        let x = graph.create_worker("X").unwrap();
        let x25 = graph.append(x, 25).unwrap();
        graph.connect(w[1], x25, EdgeType::Blocked).unwrap();
        graph.freeze();

        let path = CriticalPathEngine::default()
            .compute(&graph, w[0], Some(w[3]))
            .unwrap();
        assert_eq!(timestamps(&path), vec![0, 10, 20, 30]);
        assert_eq!(path.workers(), vec![&WorkerKey::from("W")]);
    }

    #[test]
    fn greedy_choice_can_disconnect() {
        // main blocks from 10 to 30 and is woken at 30 by a thread that was
        // already running at 5 with no link back to main.
        let mut graph = ExecGraph::new();
        let main = graph.create_worker("main").unwrap();
        let m0 = graph.append(main, 0).unwrap();
        graph.append_linked(main, 10, EdgeType::Running).unwrap();
        let (m30, _) = graph.append_linked(main, 30, EdgeType::Blocked).unwrap();
        let (m40, _) = graph.append_linked(main, 40, EdgeType::Running).unwrap();
        let waker = linked_worker(&mut graph, "waker", &[5, 30]);
        graph.connect(waker[1], m30, EdgeType::Default).unwrap();
        graph.freeze();

        // The wakeup edge outranks the blocked interval, and the waker's
        // timeline never leads back to main.
        let err = CriticalPathEngine::default()
            .compute(&graph, m0, Some(m40))
            .unwrap_err();
        match err {
            CriticalPathError::DisconnectedPath { reached, partial } => {
                assert_eq!(reached, waker[0]);
                assert_eq!(timestamps(&partial), vec![5, 30, 30, 40]);
                assert_eq!(partial.start().worker, WorkerKey::from("waker"));
            }
            other => panic!("expected DisconnectedPath, got {:?}", other),
        }
    }

    #[test]
    fn follows_waker_back_to_start() {
        let mut graph = ExecGraph::new();
        let main = graph.create_worker("main").unwrap();
        let m0 = graph.append(main, 0).unwrap();
        let (m10, _) = graph.append_linked(main, 10, EdgeType::Running).unwrap();
        let (m30, _) = graph.append_linked(main, 30, EdgeType::Blocked).unwrap();
        let (m40, _) = graph.append_linked(main, 40, EdgeType::Running).unwrap();
        let waker = graph.create_worker("waker").unwrap();
        let w12 = graph.append(waker, 12).unwrap();
        let (w30, _) = graph.append_linked(waker, 30, EdgeType::Running).unwrap();
        graph.connect(m10, w12, EdgeType::Default).unwrap();
        graph.connect(w30, m30, EdgeType::Default).unwrap();
        graph.freeze();

        let path = CriticalPathEngine::default()
            .compute(&graph, m0, Some(m40))
            .unwrap();
        assert_eq!(timestamps(&path), vec![0, 10, 12, 30, 30, 40]);
        assert_eq!(
            path.workers(),
            vec![&WorkerKey::from("main"), &WorkerKey::from("waker")]
        );
        let breakdown = path.breakdown();
        assert_eq!(breakdown[&EdgeType::Running], 38);
        assert!(!breakdown.contains_key(&EdgeType::Blocked));
    }

    #[test]
    fn ties_prefer_latest_source() {
        let mut graph = ExecGraph::new();
        let main = linked_worker(&mut graph, "main", &[0, 50]);
        let a = linked_worker(&mut graph, "a", &[5]);
        let b = linked_worker(&mut graph, "b", &[20]);
        let end = graph.create_worker("end").unwrap();
        let e60 = graph.append(end, 60).unwrap();
        graph.connect(main[0], a[0], EdgeType::Default).unwrap();
        graph.connect(main[0], b[0], EdgeType::Default).unwrap();
        graph.connect(a[0], e60, EdgeType::Network).unwrap();
        graph.connect(b[0], e60, EdgeType::Network).unwrap();
        graph.freeze();

        let path = CriticalPathEngine::default()
            .compute(&graph, main[0], Some(e60))
            .unwrap();
        assert_eq!(timestamps(&path), vec![0, 20, 60]);
    }

    #[test]
    fn custom_policy_changes_choice() {
        let mut graph = ExecGraph::new();
        let main = linked_worker(&mut graph, "main", &[0, 10, 20]);
        let side = graph.create_worker("side").unwrap();
        let s5 = graph.append(side, 5).unwrap();
        graph.connect(main[0], s5, EdgeType::Default).unwrap();
        graph.connect(s5, main[2], EdgeType::Network).unwrap();
        graph.freeze();

        let default = CriticalPathEngine::default()
            .compute(&graph, main[0], None)
            .unwrap();
        assert_eq!(timestamps(&default), vec![0, 10, 20]);

        let network_first = CriticalPathEngine::new(PriorityPolicy::new([
            EdgeType::Network,
            EdgeType::Default,
            EdgeType::Running,
        ]));
        let path = network_first.compute(&graph, main[0], None).unwrap();
        assert_eq!(timestamps(&path), vec![0, 5, 20]);
    }

    #[test]
    fn excluded_edge_types_disconnect() {
        let mut graph = ExecGraph::new();
        let main = linked_worker(&mut graph, "main", &[0, 10]);
        graph.freeze();

        let engine = CriticalPathEngine::new(PriorityPolicy::new([EdgeType::Blocked]));
        match engine.compute(&graph, main[0], None) {
            Err(CriticalPathError::DisconnectedPath { reached, partial }) => {
                assert_eq!(reached, main[1]);
                assert!(partial.is_empty());
                assert_eq!(partial.start().timestamp, 10);
            }
            other => panic!("expected DisconnectedPath, got {:?}", other),
        }
    }

    #[test]
    fn zero_length_cycles_terminate() {
        let mut graph = ExecGraph::new();
        let a = linked_worker(&mut graph, "a", &[0, 10]);
        let b = graph.create_worker("b").unwrap();
        let b10 = graph.append(b, 10).unwrap();
        graph.connect(a[1], b10, EdgeType::Default).unwrap();
        graph.connect(b10, a[1], EdgeType::Default).unwrap();
        graph.freeze();

        let path = CriticalPathEngine::default()
            .compute(&graph, a[0], Some(b10))
            .unwrap();
        assert_eq!(timestamps(&path), vec![0, 10, 10]);
    }

    #[test]
    fn start_equals_end() {
        let mut graph = ExecGraph::new();
        let main = linked_worker(&mut graph, "main", &[7]);
        graph.freeze();

        let path = CriticalPathEngine::default()
            .compute(&graph, main[0], None)
            .unwrap();
        assert!(path.is_empty());
        assert_eq!(path.start().timestamp, 7);
    }

    #[test]
    fn rejects_unfrozen_graph_and_bad_inputs() {
        let mut graph = ExecGraph::new();
        let main = linked_worker(&mut graph, "main", &[0, 10]);
        graph.create_worker("idle").unwrap();
        let engine = CriticalPathEngine::default();

        assert!(matches!(
            engine.compute(&graph, main[0], None),
            Err(CriticalPathError::GraphNotFrozen)
        ));
        graph.freeze();

        assert!(matches!(
            engine.compute(&graph, main[1], Some(main[0])),
            Err(CriticalPathError::InvalidRange { start: 10, end: 0 })
        ));
        assert!(matches!(
            engine.compute(&graph, VertexId(77), None),
            Err(CriticalPathError::VertexNotFound { .. })
        ));
        assert!(matches!(
            engine.compute_for_worker(&graph, &WorkerKey::from("nobody")),
            Err(CriticalPathError::WorkerNotFound { .. })
        ));
        assert!(matches!(
            engine.compute_for_worker(&graph, &WorkerKey::from("idle")),
            Err(CriticalPathError::EmptyWorker { .. })
        ));
    }
}
