//! Graph providers for concrete trace domains.

pub mod sched;

pub use sched::{thread_key, SchedProvider};
