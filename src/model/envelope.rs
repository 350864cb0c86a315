use super::query::QueryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identity of an envelope record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(String);

impl LogId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What produced a record: an inbound HTTP request or a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RecordKind {
    #[default]
    Http,
    Diagnostic,
}

/// Severity of a diagnostic message, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Messages at or above this level populate the error facets.
    pub const ERROR_THRESHOLD: Severity = Severity::Error;

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "Trace",
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
        }
    }

    pub fn is_error(&self) -> bool {
        *self >= Self::ERROR_THRESHOLD
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "information" | "info" => Ok(Severity::Information),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" | "fatal" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Information,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// One captured request (a root) or one diagnostic message (a child when it
/// carries `correlation_id`, standalone otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LogId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub kind: RecordKind,

    // Request facets
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query_string: Option<String>,
    #[serde(default)]
    pub request_headers: Option<String>,
    #[serde(default)]
    pub request_body: Option<String>,

    // Response facets
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub response_body: Option<String>,
    #[serde(default)]
    pub execution_ms: Option<u64>,

    // Classification
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub level: Option<Severity>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: Option<String>,

    // Error facets
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,

    #[serde(default)]
    pub queries: Vec<QueryRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<LogId>,
}

impl EnvelopeRecord {
    /// Pre-image of a request: identity fields only, response facets empty.
    pub fn pre_image(timestamp: DateTime<Utc>, method: &str, path: &str) -> Self {
        Self {
            timestamp,
            kind: RecordKind::Http,
            method: Some(method.to_string()),
            path: Some(path.to_string()),
            ..Self::default()
        }
    }

    /// A diagnostic message, correlated to `parent` when one is active.
    pub fn diagnostic(
        timestamp: DateTime<Utc>,
        level: Severity,
        message: String,
        source: Option<String>,
        parent: Option<LogId>,
    ) -> Self {
        let is_error = level.is_error();
        Self {
            timestamp,
            kind: RecordKind::Diagnostic,
            level: Some(level),
            source,
            error_message: if is_error { Some(message.clone()) } else { None },
            message: Some(message),
            is_error,
            correlation_id: parent,
            ..Self::default()
        }
    }

    pub fn is_child(&self) -> bool {
        self.correlation_id.is_some()
    }

    pub fn is_root(&self) -> bool {
        !self.is_child()
    }

    /// Diagnostic record owned by a request.
    pub fn is_correlated_child(&self) -> bool {
        self.kind == RecordKind::Diagnostic && self.correlation_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_threshold_starts_at_error() {
        assert!(!Severity::Warning.is_error());
        assert!(Severity::Error.is_error());
        assert!(Severity::Critical.is_error());
        assert!(Severity::Information < Severity::Warning);
    }

    #[test]
    fn severity_parses_common_spellings() {
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Information);
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn diagnostic_record_populates_error_facets_above_threshold() {
        let now = Utc::now();
        let child = EnvelopeRecord::diagnostic(
            now,
            Severity::Error,
            "boom".into(),
            None,
            Some(LogId::from("root-1")),
        );
        assert!(child.is_child());
        assert!(child.is_correlated_child());
        assert!(child.is_error);
        assert_eq!(child.error_message.as_deref(), Some("boom"));

        let standalone =
            EnvelopeRecord::diagnostic(now, Severity::Information, "hello".into(), None, None);
        assert!(standalone.is_root());
        assert!(!standalone.is_error);
        assert_eq!(standalone.error_message, None);
    }

    #[test]
    fn envelope_round_trips_through_json_document() {
        let mut record = EnvelopeRecord::pre_image(Utc::now(), "POST", "/orders");
        record.id = Some(LogId::from("abc"));
        record.status_code = Some(201);
        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["method"], "POST");
        assert_eq!(doc["statusCode"], 201);
        let back: EnvelopeRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(back, record);
    }
}
