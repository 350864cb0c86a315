//! `tracing` integration: application events become diagnostic messages.
//!
//! ```no_run
//! use reqlens::correlation::layer;
//! use tracing_subscriber::prelude::*;
//!
//! # async fn example(writer: std::sync::Arc<reqlens::correlation::DiagnosticWriter>) {
//! let (layer, _writer_task) = layer::start(writer);
//! let _ = tracing_subscriber::registry().with(layer).try_init();
//! # }
//! ```

use super::context::RequestContext;
use super::diagnostics::{DiagnosticMessage, DiagnosticWriter};
use crate::model::Severity;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{Event, warn};
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::registry::LookupSpan;

const DIAGNOSTIC_QUEUE_CAPACITY: usize = 512;

const OWN_TARGET: &str = "reqlens";

/// Events from this crate never become diagnostics.
fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

pub struct DiagnosticLayer {
    sender: mpsc::Sender<DiagnosticMessage>,
    dropped: Arc<AtomicU64>,
}

/// Spawns the writer task and returns the layer feeding it.
pub fn start(writer: Arc<DiagnosticWriter>) -> (DiagnosticLayer, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(DIAGNOSTIC_QUEUE_CAPACITY);
    let layer = DiagnosticLayer::with_sender(sender);
    let handle = tokio::spawn(run_writer(writer, receiver, layer.dropped.clone()));
    (layer, handle)
}

impl DiagnosticLayer {
    /// A layer whose messages are delivered to `sender` instead of a writer task.
    pub fn with_sender(sender: mpsc::Sender<DiagnosticMessage>) -> Self {
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Messages lost because the writer was gone or no runtime could queue them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, message: DiagnosticMessage) {
        let message = match self.sender.try_send(message) {
            Ok(()) => return,
            Err(TrySendError::Full(message)) => message,
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        // Queue full: wait for a slot off the emitting thread.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sender = self.sender.clone();
                let dropped = self.dropped.clone();
                handle.spawn(async move {
                    if sender.send(message).await.is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<S> Layer<S> for DiagnosticLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let source = match (metadata.module_path(), metadata.file(), metadata.line()) {
            (Some(module), _, _) => module.to_string(),
            (None, Some(file), Some(line)) => format!("{file}:{line}"),
            _ => metadata.target().to_string(),
        };
        // The root is captured here, on the emitting task.
        let message = DiagnosticMessage::new(
            Severity::from(*metadata.level()),
            visitor.into_text(),
            Utc::now(),
        )
        .with_source(source)
        .correlated(RequestContext::current_root().map(|root| root.id));

        self.deliver(message);
    }
}

async fn run_writer(
    writer: Arc<DiagnosticWriter>,
    mut receiver: mpsc::Receiver<DiagnosticMessage>,
    dropped: Arc<AtomicU64>,
) {
    while let Some(message) = receiver.recv().await {
        writer.write(message).await;
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            warn!(lost, "diagnostic messages were dropped before reaching the writer");
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn into_text(self) -> String {
        match (self.message, self.fields.is_empty()) {
            (Some(message), true) => message,
            (Some(message), false) => format!("{message} {}", self.fields),
            (None, _) => self.fields,
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" && self.message.is_none() {
            self.message = Some(value.to_string());
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push_field(field.name(), &value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" && self.message.is_none() {
            self.message = Some(rendered);
        } else {
            self.push_field(field.name(), &rendered);
        }
    }
}
