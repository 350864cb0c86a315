//! Records shared by the pipeline, the interceptor, the correlation registry
//! and the persistence gateway.

pub mod envelope;
pub mod query;
pub mod settings;
pub mod stats;

pub use envelope::{EnvelopeRecord, LogId, RecordKind, Severity};
pub use query::{OperationKind, QueryRecord};
pub use settings::{MonitorSettings, RetentionSettings};
pub use stats::{PruneSummary, StatisticsRecord};
