//! Database command interception feeding the per-request query buffer.

pub mod bridge;
pub mod classify;
pub mod collector;

pub use bridge::{Command, CommandExecutor, ConnectionInfo, InterceptedExecutor, QueryInterceptor};
pub use classify::{CommandPathway, classify_operation, extract_table_name};
pub use collector::{QueryCollector, QueryTicket};
