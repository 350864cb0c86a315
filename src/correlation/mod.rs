//! Correlation of out-of-band diagnostic messages to the request in flight.

pub mod context;
pub mod diagnostics;
pub mod layer;

pub use context::{ActiveRoot, RequestContext};
pub use diagnostics::{DiagnosticMessage, DiagnosticWriter, split_source_annotation};
pub use layer::DiagnosticLayer;
