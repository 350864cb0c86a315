//! Persists diagnostic messages, correlated to the request in flight when
//! there is one.

use super::context::RequestContext;
use crate::core::Clock;
use crate::gateway::{LogRepository, SettingsCache};
use crate::model::{EnvelopeRecord, LogId, Severity};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::warn;

lazy_static! {
    static ref SOURCE_ANNOTATION: Option<Regex> =
        Regex::new(r"(?i)\s*\[source:\s*([^\]]*)\]").ok();
}

/// Removes a `[source: ...]` annotation from `text`, returning the remaining
/// text and the annotation value.
pub fn split_source_annotation(text: &str) -> (String, Option<String>) {
    let Some(pattern) = SOURCE_ANNOTATION.as_ref() else {
        return (text.to_string(), None);
    };
    let Some(captures) = pattern.captures(text) else {
        return (text.to_string(), None);
    };
    let source = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let stripped = pattern.replace(text, "").trim().to_string();
    (stripped, source)
}

/// A message waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticMessage {
    pub level: Severity,
    pub text: String,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Root the message belongs to, captured when it was emitted.
    pub parent: Option<LogId>,
}

impl DiagnosticMessage {
    pub fn new(level: Severity, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            level,
            text: text.into(),
            source: None,
            timestamp,
            parent: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn correlated(mut self, parent: Option<LogId>) -> Self {
        self.parent = parent;
        self
    }

    fn into_record(self, service_name: Option<&str>) -> EnvelopeRecord {
        let (text, annotated) = split_source_annotation(&self.text);
        let mut record = EnvelopeRecord::diagnostic(
            self.timestamp,
            self.level,
            text,
            annotated.or(self.source),
            self.parent,
        );
        record.service_name = service_name.map(str::to_string);
        record
    }
}

pub struct DiagnosticWriter {
    repository: Arc<dyn LogRepository>,
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
    service_name: Option<String>,
}

impl DiagnosticWriter {
    pub fn new(
        repository: Arc<dyn LogRepository>,
        settings: Arc<SettingsCache>,
        clock: Arc<dyn Clock>,
        service_name: Option<String>,
    ) -> Self {
        Self {
            repository,
            settings,
            clock,
            service_name,
        }
    }

    /// Emits a message for the request in flight on this task, or a
    /// standalone record when there is none.
    pub async fn emit(&self, level: Severity, text: impl Into<String>) -> Option<LogId> {
        let context = RequestContext::current();
        self.emit_in(context.as_ref(), level, text).await
    }

    /// Emits a message on behalf of an explicitly passed request context.
    pub async fn emit_in(
        &self,
        context: Option<&RequestContext>,
        level: Severity,
        text: impl Into<String>,
    ) -> Option<LogId> {
        let message = DiagnosticMessage::new(level, text, self.clock.now())
            .correlated(context.and_then(RequestContext::root_id));
        self.write(message).await
    }

    /// Filters by the capture settings and persists. Failures are logged
    /// and swallowed.
    pub async fn write(&self, message: DiagnosticMessage) -> Option<LogId> {
        let settings = self.settings.current().await;
        if !settings.capture_diagnostics || message.level < settings.minimum_level {
            return None;
        }

        let record = message.into_record(self.service_name.as_deref());
        match self.repository.insert_log(&record).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, correlated = record.is_child(), "failed to persist diagnostic record");
                None
            }
        }
    }
}
