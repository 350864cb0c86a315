//! Operator-facing facade over the capture subsystem.

pub mod monitor;
pub mod view;

pub use monitor::{DEFAULT_BASE_PATH, MonitorBuilder, RequestMonitor};
pub use view::{Localized, LogDetail, LogView, StatsView, Timestamped};
