//! Edge priority table used to pick among incoming edges.
//!
//! The table is an ordered list of edge types: earlier entries win. Edge types
//! that do not appear in the table are never followed.

use serde::{Deserialize, Serialize};

use tgraph_core::EdgeType;

/// Ranked edge types for the backward traversal.
///
/// Serialized as a plain JSON array, e.g. `["running", "blocked", "unknown"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<EdgeType>", into = "Vec<EdgeType>")]
pub struct PriorityPolicy {
    order: Vec<EdgeType>,
    ranks: [Option<u8>; EdgeType::COUNT],
}

impl PriorityPolicy {
    /// Builds a policy from an ordered list. Duplicates keep their first rank.
    pub fn new(order: impl IntoIterator<Item = EdgeType>) -> Self {
        let mut ranks = [None; EdgeType::COUNT];
        let mut kept = Vec::new();
        for ty in order {
            let slot = &mut ranks[slot_of(ty)];
            if slot.is_none() {
                *slot = Some(kept.len() as u8);
                kept.push(ty);
            }
        }
        PriorityPolicy { order: kept, ranks }
    }

    /// Rank of `edge_type`, lower is better. `None` if the type is excluded.
    pub fn rank(&self, edge_type: EdgeType) -> Option<u8> {
        self.ranks[slot_of(edge_type)]
    }

    /// The ranked edge types, best first.
    pub fn order(&self) -> &[EdgeType] {
        &self.order
    }
}

impl Default for PriorityPolicy {
    /// Active states first, then waits on a known resource, then wakeup
    /// links, and finally the blocked interval itself.
    fn default() -> Self {
        PriorityPolicy::new([
            EdgeType::Running,
            EdgeType::Interrupted,
            EdgeType::Preempted,
            EdgeType::Timer,
            EdgeType::Network,
            EdgeType::BlockDevice,
            EdgeType::UserInput,
            EdgeType::Ipi,
            EdgeType::Default,
            EdgeType::Blocked,
            EdgeType::Epsilon,
            EdgeType::Unknown,
        ])
    }
}

impl From<Vec<EdgeType>> for PriorityPolicy {
    fn from(order: Vec<EdgeType>) -> Self {
        PriorityPolicy::new(order)
    }
}

impl From<PriorityPolicy> for Vec<EdgeType> {
    fn from(policy: PriorityPolicy) -> Self {
        policy.order
    }
}

fn slot_of(edge_type: EdgeType) -> usize {
    edge_type as usize
}
