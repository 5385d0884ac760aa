mod extract;
mod model;
mod scan;
mod validate;

pub use extract::{ExtractionFailure, GraphExtractor};
pub use model::{Edge, ThreatGraph, Vertex, VertexType};
pub use validate::{GraphViolation, ValidatedGraph, ValidationError};
