//! Records as handed to callers: stored UTC values plus their rendering in
//! the display zone.

use crate::gateway::DisplayZone;
use crate::model::{EnvelopeRecord, StatisticsRecord};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for EnvelopeRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for StatisticsRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Localized<T> {
    #[serde(flatten)]
    pub record: T,
    pub local_timestamp: DateTime<FixedOffset>,
}

impl<T: Timestamped> Localized<T> {
    pub fn new(record: T, zone: &DisplayZone) -> Self {
        let local_timestamp = zone.convert(record.timestamp());
        Self {
            record,
            local_timestamp,
        }
    }
}

pub type LogView = Localized<EnvelopeRecord>;
pub type StatsView = Localized<StatisticsRecord>;

/// A record and the diagnostic children correlated to it, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDetail {
    pub log: LogView,
    pub related: Vec<LogView>,
}
