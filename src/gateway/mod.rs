//! Persistence gateway: the only component that talks to the document store.

pub mod filter;
pub mod repository;
pub mod settings;
pub mod zone;

use crate::core::Result;
use crate::model::{EnvelopeRecord, LogId, MonitorSettings, StatisticsRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use filter::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, LogFilter, LogPage, MAX_PAGE_SIZE, PageRequest};
pub use repository::DocumentLogRepository;
pub use settings::SettingsCache;
pub use zone::DisplayZone;

pub const LOGS_COLLECTION: &str = "logs";
pub const STATS_COLLECTION: &str = "stats";
pub const CONFIG_COLLECTION: &str = "config";

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Persists a new record and returns its store-assigned id.
    async fn insert_log(&self, record: &EnvelopeRecord) -> Result<LogId>;

    /// Rewrites a root in place. Children are write-once and rejected.
    async fn update_log(&self, record: &EnvelopeRecord) -> Result<()>;

    async fn find_log(&self, id: &LogId) -> Result<Option<EnvelopeRecord>>;

    /// Children of `id`, oldest first.
    async fn find_related(&self, id: &LogId) -> Result<Vec<EnvelopeRecord>>;

    /// Newest first, offset-paginated; `total` ignores pagination.
    async fn list_logs(
        &self,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<LogPage<EnvelopeRecord>>;

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64>;

    async fn delete_all_logs(&self) -> Result<u64>;

    /// Deletes records strictly older than `cutoff`.
    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Full recount of every classification bucket.
    async fn compute_statistics(&self, at: DateTime<Utc>) -> Result<StatisticsRecord>;

    async fn insert_statistics(&self, stats: &StatisticsRecord) -> Result<()>;

    async fn latest_statistics(&self) -> Result<Option<StatisticsRecord>>;

    async fn load_settings(&self) -> Result<Option<MonitorSettings>>;

    /// Upserts the single configuration record.
    async fn save_settings(&self, settings: &MonitorSettings) -> Result<()>;
}
