//! Vertices and workers of the execution graph.

use serde::{Deserialize, Serialize};

use crate::id::{VertexId, WorkerId, WorkerKey};

/// A timestamped point on a worker's timeline. Immutable once appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    /// Timestamp in nanoseconds.
    pub timestamp: i64,
    /// The worker whose timeline this vertex belongs to.
    pub worker: WorkerId,
}

/// An execution context and its ordered timeline.
///
/// `vertices` is sorted by strictly increasing timestamp, which is what makes
/// [`Worker::position_at`] a binary search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub key: WorkerKey,
    vertices: Vec<VertexId>,
    timestamps: Vec<i64>,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, key: WorkerKey) -> Self {
        Worker {
            id,
            key,
            vertices: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, vertex: VertexId, timestamp: i64) {
        self.vertices.push(vertex);
        self.timestamps.push(timestamp);
    }

    /// The worker's vertices in timeline order.
    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// First vertex of the timeline.
    pub fn head(&self) -> Option<VertexId> {
        self.vertices.first().copied()
    }

    /// Last vertex of the timeline.
    pub fn tail(&self) -> Option<VertexId> {
        self.vertices.last().copied()
    }

    /// Timestamp of the last vertex.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    /// Index of the last vertex whose timestamp is `<= timestamp`.
    pub fn position_at(&self, timestamp: i64) -> Option<usize> {
        match self.timestamps.partition_point(|&ts| ts <= timestamp) {
            0 => None,
            n => Some(n - 1),
        }
    }
}
