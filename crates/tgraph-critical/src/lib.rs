//! Critical path analysis over frozen execution graphs.
//!
//! - [`CriticalPathEngine`]: backward greedy traversal from an end vertex to
//!   a start vertex.
//! - [`PriorityPolicy`]: the configurable edge-type ranking it uses.
//! - [`CriticalPath`]: the owned result, including a reduced graph.

pub mod engine;
pub mod error;
pub mod path;
pub mod policy;

pub use engine::CriticalPathEngine;
pub use error::CriticalPathError;
pub use path::{CriticalPath, PathEdge, PathVertex};
pub use policy::PriorityPolicy;
