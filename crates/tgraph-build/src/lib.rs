//! Building execution graphs from trace event streams.
//!
//! A [`TraceReader`] serves [`EventRequest`]s on its own thread. The
//! [`GraphBuilder`] wraps a [`GraphProvider`] in a request, runs it over the
//! whole trace and freezes the result, which can then be handed to the
//! critical path engine.

pub mod builder;
pub mod error;
pub mod event;
pub mod provider;
pub mod providers;
pub mod reader;
pub mod request;

pub use builder::{BuildMonitor, BuildReport, BuildState, BuilderConfig, ConflictPolicy, GraphBuilder};
pub use error::{BuildError, TraceError};
pub use event::{TimeRange, TraceEvent};
pub use provider::{GraphProvider, SharedGraph};
pub use providers::SchedProvider;
pub use reader::{MemoryTrace, TraceReader};
pub use request::{EventRequest, ExecutionType, RequestDriver, RequestHandler, RequestOutcome, ALL_DATA};
