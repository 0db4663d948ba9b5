//! Edge types of the execution graph.
//!
//! Horizontal edges connect consecutive vertices of one worker and describe
//! what the worker was doing during that interval. Vertical edges connect
//! vertices of different workers and describe a causal relation (a wakeup, a
//! message, an interrupt).

use std::fmt;

use serde::{Deserialize, Serialize};

/// What an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Zero-length link, used to stitch vertices together.
    Epsilon,
    /// The state of the worker during this interval is not known.
    Unknown,
    /// Generic causal link, typically a vertical wakeup edge.
    Default,
    /// The worker was executing.
    Running,
    /// The worker was waiting on a dependency.
    Blocked,
    /// The worker was interrupted by a hardware or software interrupt.
    Interrupted,
    /// The worker was runnable but another worker held the CPU.
    Preempted,
    /// The worker was waiting on a timer.
    Timer,
    /// The worker was waiting on network traffic.
    Network,
    /// The worker was waiting on user input.
    UserInput,
    /// The worker was waiting on a block device.
    BlockDevice,
    /// Inter-processor interrupt.
    Ipi,
}

impl EdgeType {
    pub const COUNT: usize = 12;

    /// Every edge type, in declaration order.
    pub const ALL: [EdgeType; EdgeType::COUNT] = [
        EdgeType::Epsilon,
        EdgeType::Unknown,
        EdgeType::Default,
        EdgeType::Running,
        EdgeType::Blocked,
        EdgeType::Interrupted,
        EdgeType::Preempted,
        EdgeType::Timer,
        EdgeType::Network,
        EdgeType::UserInput,
        EdgeType::BlockDevice,
        EdgeType::Ipi,
    ];

    /// Returns `true` if the worker makes progress during this edge.
    pub fn is_active(&self) -> bool {
        matches!(self, EdgeType::Running | EdgeType::Interrupted)
    }

    /// Snake-case name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            EdgeType::Epsilon => "epsilon",
            EdgeType::Unknown => "unknown",
            EdgeType::Default => "default",
            EdgeType::Running => "running",
            EdgeType::Blocked => "blocked",
            EdgeType::Interrupted => "interrupted",
            EdgeType::Preempted => "preempted",
            EdgeType::Timer => "timer",
            EdgeType::Network => "network",
            EdgeType::UserInput => "user_input",
            EdgeType::BlockDevice => "block_device",
            EdgeType::Ipi => "ipi",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Edge weight stored in the graph.
///
/// `duration` is derived from the endpoint timestamps when the edge is
/// connected and is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_type: EdgeType,
    pub duration: i64,
}

impl Edge {
    pub fn new(edge_type: EdgeType, duration: i64) -> Self {
        Edge {
            edge_type,
            duration,
        }
    }
}
