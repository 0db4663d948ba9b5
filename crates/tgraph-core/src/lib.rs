pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod vertex;

// Re-export commonly used types
pub use edge::{Edge, EdgeType};
pub use error::GraphError;
pub use graph::{EdgeView, ExecGraph};
pub use id::{EdgeId, VertexId, WorkerId, WorkerKey};
pub use vertex::{Vertex, Worker};
