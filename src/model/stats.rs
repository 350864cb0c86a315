use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the most recent retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneSummary {
    pub timestamp: DateTime<Utc>,
    pub deleted: u64,
}

/// Aggregate snapshot over the `logs` collection. The newest snapshot by
/// `timestamp` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsRecord {
    pub timestamp: DateTime<Utc>,
    pub total: u64,
    /// Responses with a 2xx status.
    pub success: u64,
    /// Responses with a status of 400 or above.
    pub failure: u64,
    pub diagnostic: u64,
    #[serde(default)]
    pub last_prune: Option<PruneSummary>,
}

impl StatisticsRecord {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total: 0,
            success: 0,
            failure: 0,
            diagnostic: 0,
            last_prune: None,
        }
    }
}
