use super::{
    CONFIG_COLLECTION, LOGS_COLLECTION, LogFilter, LogPage, LogRepository, PageRequest,
    STATS_COLLECTION,
};
use crate::core::{CaptureError, Result};
use crate::model::{EnvelopeRecord, LogId, MonitorSettings, RecordKind, StatisticsRecord};
use crate::storage::{Document, DocumentStore, ID_FIELD};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::warn;

/// [`LogRepository`] backed by the in-crate [`DocumentStore`].
#[derive(Clone)]
pub struct DocumentLogRepository {
    store: Arc<DocumentStore>,
}

fn decode<T: DeserializeOwned>(document: Document) -> Option<T> {
    match serde_json::from_value(document) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "skipping malformed document");
            None
        }
    }
}

fn document_timestamp(document: &Document) -> Option<DateTime<Utc>> {
    document
        .get("timestamp")
        .and_then(|value| value.as_str())
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn newest_first(a: &EnvelopeRecord, b: &EnvelopeRecord) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

fn oldest_first(a: &EnvelopeRecord, b: &EnvelopeRecord) -> Ordering {
    a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))
}

impl DocumentLogRepository {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(DocumentStore::in_memory()))
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    async fn matching_logs(&self, filter: &LogFilter) -> Result<Vec<EnvelopeRecord>> {
        let documents = self.store.find(LOGS_COLLECTION, |_| true).await?;
        Ok(documents
            .into_iter()
            .filter_map(decode::<EnvelopeRecord>)
            .filter(|record| filter.matches(record))
            .collect())
    }
}

#[async_trait]
impl LogRepository for DocumentLogRepository {
    async fn insert_log(&self, record: &EnvelopeRecord) -> Result<LogId> {
        if let Some(parent) = &record.correlation_id {
            let parent_exists = self.store.get(LOGS_COLLECTION, parent.as_str()).await?.is_some();
            if !parent_exists {
                return Err(CaptureError::NotFound(
                    parent.to_string(),
                    LOGS_COLLECTION.to_string(),
                ));
            }
        }
        let mut document = serde_json::to_value(record)?;
        if let Some(object) = document.as_object_mut() {
            object.remove(ID_FIELD);
        }
        let id = self.store.insert(LOGS_COLLECTION, document).await?;
        Ok(LogId::new(id))
    }

    async fn update_log(&self, record: &EnvelopeRecord) -> Result<()> {
        let id = record
            .id
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidInput("record has no id".to_string()))?;
        if record.is_child() {
            return Err(CaptureError::ImmutableRecord(id.to_string()));
        }
        let stored = self
            .store
            .get(LOGS_COLLECTION, id.as_str())
            .await?
            .and_then(decode::<EnvelopeRecord>)
            .ok_or_else(|| CaptureError::NotFound(id.to_string(), LOGS_COLLECTION.to_string()))?;
        if stored.is_child() {
            return Err(CaptureError::ImmutableRecord(id.to_string()));
        }
        // The query list freezes with the first post-image.
        if stored.status_code.is_some() && stored.queries != record.queries {
            return Err(CaptureError::InvalidInput(format!(
                "query list of '{id}' is frozen"
            )));
        }
        let document = serde_json::to_value(record)?;
        self.store.replace(LOGS_COLLECTION, id.as_str(), document).await
    }

    async fn find_log(&self, id: &LogId) -> Result<Option<EnvelopeRecord>> {
        Ok(self
            .store
            .get(LOGS_COLLECTION, id.as_str())
            .await?
            .and_then(decode))
    }

    async fn find_related(&self, id: &LogId) -> Result<Vec<EnvelopeRecord>> {
        let documents = self
            .store
            .find(LOGS_COLLECTION, |document| {
                document.get("correlationId").and_then(|value| value.as_str()) == Some(id.as_str())
            })
            .await?;
        let mut related: Vec<EnvelopeRecord> = documents.into_iter().filter_map(decode).collect();
        related.sort_by(oldest_first);
        Ok(related)
    }

    async fn list_logs(
        &self,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<LogPage<EnvelopeRecord>> {
        let mut records = self.matching_logs(filter).await?;
        records.sort_by(newest_first);
        let total = records.len() as u64;
        let items = records
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .collect();
        Ok(LogPage {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64> {
        Ok(self.matching_logs(filter).await?.len() as u64)
    }

    async fn delete_all_logs(&self) -> Result<u64> {
        self.store.clear(LOGS_COLLECTION).await
    }

    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.store
            .delete_where(LOGS_COLLECTION, |document| {
                document_timestamp(document).is_some_and(|ts| ts < cutoff)
            })
            .await
    }

    async fn compute_statistics(&self, at: DateTime<Utc>) -> Result<StatisticsRecord> {
        let documents = self.store.find(LOGS_COLLECTION, |_| true).await?;
        let mut stats = StatisticsRecord::empty(at);
        for record in documents.into_iter().filter_map(decode::<EnvelopeRecord>) {
            stats.total += 1;
            if record.kind == RecordKind::Diagnostic {
                stats.diagnostic += 1;
            }
            match record.status_code {
                Some(status) if (200..300).contains(&status) => stats.success += 1,
                Some(status) if status >= 400 => stats.failure += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn insert_statistics(&self, stats: &StatisticsRecord) -> Result<()> {
        self.store
            .insert(STATS_COLLECTION, serde_json::to_value(stats)?)
            .await?;
        Ok(())
    }

    async fn latest_statistics(&self) -> Result<Option<StatisticsRecord>> {
        let documents = self.store.find(STATS_COLLECTION, |_| true).await?;
        Ok(documents
            .into_iter()
            .filter_map(decode::<StatisticsRecord>)
            .max_by_key(|stats| stats.timestamp))
    }

    async fn load_settings(&self) -> Result<Option<MonitorSettings>> {
        let documents = self.store.find(CONFIG_COLLECTION, |_| true).await?;
        Ok(documents.into_iter().find_map(decode))
    }

    async fn save_settings(&self, settings: &MonitorSettings) -> Result<()> {
        let document = serde_json::to_value(settings)?;
        let existing = self.store.find(CONFIG_COLLECTION, |_| true).await?;
        let existing_id = existing
            .first()
            .and_then(|doc| doc.get(ID_FIELD))
            .and_then(|value| value.as_str())
            .map(str::to_string);
        match existing_id {
            Some(id) => self.store.replace(CONFIG_COLLECTION, &id, document).await,
            None => self.store.insert(CONFIG_COLLECTION, document).await.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_then_update_root() {
        let repo = DocumentLogRepository::in_memory();
        let mut record = EnvelopeRecord::pre_image(at(1), "GET", "/a");
        let id = repo.insert_log(&record).await.unwrap();
        record.id = Some(id.clone());
        record.status_code = Some(200);
        repo.update_log(&record).await.unwrap();

        let stored = repo.find_log(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.status_code, Some(200));
    }

    #[tokio::test]
    async fn children_require_existing_parent_and_are_write_once() {
        let repo = DocumentLogRepository::in_memory();
        let orphan = EnvelopeRecord::diagnostic(
            at(1),
            Severity::Information,
            "x".into(),
            None,
            Some(LogId::from("nope")),
        );
        assert!(matches!(
            repo.insert_log(&orphan).await,
            Err(CaptureError::NotFound(_, _))
        ));

        let root_id = repo
            .insert_log(&EnvelopeRecord::pre_image(at(1), "GET", "/a"))
            .await
            .unwrap();
        let mut child = EnvelopeRecord::diagnostic(
            at(1),
            Severity::Information,
            "x".into(),
            None,
            Some(root_id),
        );
        let child_id = repo.insert_log(&child).await.unwrap();
        child.id = Some(child_id);
        assert!(matches!(
            repo.update_log(&child).await,
            Err(CaptureError::ImmutableRecord(_))
        ));
    }

    #[tokio::test]
    async fn cutoff_is_strict() {
        let repo = DocumentLogRepository::in_memory();
        let now = at(12);
        let cutoff = now - Duration::hours(24);
        repo.insert_log(&EnvelopeRecord::pre_image(cutoff - Duration::seconds(1), "GET", "/old"))
            .await
            .unwrap();
        repo.insert_log(&EnvelopeRecord::pre_image(cutoff, "GET", "/edge"))
            .await
            .unwrap();
        repo.insert_log(&EnvelopeRecord::pre_image(now, "GET", "/new"))
            .await
            .unwrap();

        assert_eq!(repo.delete_logs_older_than(cutoff).await.unwrap(), 1);
        let remaining = repo
            .list_logs(&LogFilter::default(), PageRequest::default())
            .await
            .unwrap();
        let paths: Vec<_> = remaining.items.iter().filter_map(|r| r.path.clone()).collect();
        assert_eq!(paths, vec!["/new".to_string(), "/edge".to_string()]);
    }

    #[tokio::test]
    async fn statistics_bucket_by_status_and_kind() {
        let repo = DocumentLogRepository::in_memory();
        for status in [200u16, 204, 404, 500] {
            let mut record = EnvelopeRecord::pre_image(at(2), "GET", "/s");
            record.status_code = Some(status);
            repo.insert_log(&record).await.unwrap();
        }
        repo.insert_log(&EnvelopeRecord::diagnostic(
            at(2),
            Severity::Warning,
            "w".into(),
            None,
            None,
        ))
        .await
        .unwrap();

        let stats = repo.compute_statistics(at(3)).await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failure, 2);
        assert_eq!(stats.diagnostic, 1);
    }

    #[tokio::test]
    async fn latest_statistics_wins_by_timestamp() {
        let repo = DocumentLogRepository::in_memory();
        repo.insert_statistics(&StatisticsRecord::empty(at(5))).await.unwrap();
        repo.insert_statistics(&StatisticsRecord::empty(at(9))).await.unwrap();
        repo.insert_statistics(&StatisticsRecord::empty(at(7))).await.unwrap();
        assert_eq!(repo.latest_statistics().await.unwrap().unwrap().timestamp, at(9));
    }

    #[tokio::test]
    async fn settings_are_upserted_as_a_single_record() {
        let repo = DocumentLogRepository::in_memory();
        assert_eq!(repo.load_settings().await.unwrap(), None);

        let mut settings = MonitorSettings::default();
        repo.save_settings(&settings).await.unwrap();
        settings.ignore_paths = vec!["/health".into()];
        repo.save_settings(&settings).await.unwrap();

        assert_eq!(repo.load_settings().await.unwrap(), Some(settings));
        assert_eq!(repo.store().count(CONFIG_COLLECTION, |_| true).await.unwrap(), 1);
    }
}
