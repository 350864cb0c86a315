use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for heuristics that could not produce a value.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Truncate,
    Execute,
    Unknown,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Select => "SELECT",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Create => "CREATE",
            OperationKind::Alter => "ALTER",
            OperationKind::Drop => "DROP",
            OperationKind::Truncate => "TRUNCATE",
            OperationKind::Execute => "EXECUTE",
            OperationKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intercepted database command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub database_kind: String,
    pub database_name: String,
    pub command_text: String,
    /// JSON object text of the bound parameters.
    pub parameters: String,
    pub operation: OperationKind,
    pub table_name: String,
    pub caller: String,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}
