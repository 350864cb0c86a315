//! # reqlens
//!
//! Request capture for axum services. Every inbound request becomes an
//! envelope record (request and response facets, timing, route labels, and
//! the database commands it ran). Diagnostic messages emitted while the
//! request is in flight become child records correlated to it. Records past
//! a configured age are pruned by an interval-gated, single-flight pruner.
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use reqlens::RequestMonitor;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let monitor = Arc::new(RequestMonitor::in_memory());
//! let app = monitor
//!     .capture(Router::new().route("/orders", get(|| async { "[]" })))
//!     .merge(reqlens::web::router(monitor.clone()));
//! # let _ = app;
//! # }
//! ```

pub mod config;
pub mod core;
pub mod correlation;
pub mod facade;
pub mod gateway;
pub mod interceptor;
pub mod model;
pub mod pipeline;
pub mod retention;
pub mod storage;
pub mod web;

pub use core::{CaptureError, Clock, ManualClock, Result, SystemClock};
pub use correlation::{DiagnosticLayer, DiagnosticWriter, RequestContext};
pub use facade::{LogDetail, LogView, MonitorBuilder, RequestMonitor};
pub use gateway::{DocumentLogRepository, LogFilter, LogPage, LogRepository, PageRequest};
pub use interceptor::{Command, CommandExecutor, ConnectionInfo, InterceptedExecutor};
pub use model::{EnvelopeRecord, LogId, MonitorSettings, QueryRecord, Severity};
pub use pipeline::RouteLabels;
pub use retention::{PruneOutcome, RetentionPruner};
pub use storage::{DocumentStore, DurabilityMode};
