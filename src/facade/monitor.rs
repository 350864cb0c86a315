//! `RequestMonitor`: the one handle a host application keeps.
//!
//! It wires the repository, the settings cache, the diagnostic writer, the
//! pruner and the capture pipeline together, and exposes the operator-facing
//! operations (listing, lookup, bulk delete, forced prune, statistics and
//! settings).

use super::view::{Localized, LogDetail, LogView, StatsView};
use crate::core::{CaptureError, Clock, Result, SystemClock};
use crate::correlation::{DiagnosticLayer, DiagnosticWriter, layer};
use crate::gateway::{
    DisplayZone, DocumentLogRepository, LogFilter, LogPage, LogRepository, PageRequest,
    SettingsCache,
};
use crate::model::{LogId, MonitorSettings, Severity};
use crate::pipeline::{CapturePipeline, capture_layer};
use crate::retention::{PruneOutcome, RetentionPruner, RetentionWorker, spawn_retention_worker};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

pub const DEFAULT_BASE_PATH: &str = "/_reqlens";

pub struct MonitorBuilder {
    repository: Option<Arc<dyn LogRepository>>,
    clock: Option<Arc<dyn Clock>>,
    service_name: Option<String>,
    base_path: String,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self {
            repository: None,
            clock: None,
            service_name: None,
            base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }
}

impl MonitorBuilder {
    pub fn repository(mut self, repository: Arc<dyn LogRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Falls back to an in-memory store and the system clock.
    pub fn build(self) -> RequestMonitor {
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(DocumentLogRepository::in_memory()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let settings = Arc::new(SettingsCache::new(repository.clone()));
        let diagnostics = Arc::new(DiagnosticWriter::new(
            repository.clone(),
            settings.clone(),
            clock.clone(),
            self.service_name.clone(),
        ));
        let pruner = Arc::new(RetentionPruner::new(
            repository.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let pipeline = Arc::new(CapturePipeline::new(
            repository.clone(),
            settings.clone(),
            pruner.clone(),
            clock.clone(),
            self.base_path.clone(),
            self.service_name,
        ));

        RequestMonitor {
            repository,
            settings,
            clock,
            diagnostics,
            pruner,
            pipeline,
            base_path: self.base_path,
        }
    }
}

pub struct RequestMonitor {
    repository: Arc<dyn LogRepository>,
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<DiagnosticWriter>,
    pruner: Arc<RetentionPruner>,
    pipeline: Arc<CapturePipeline>,
    base_path: String,
}

impl RequestMonitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    pub fn repository(&self) -> &Arc<dyn LogRepository> {
        &self.repository
    }

    pub fn settings_cache(&self) -> &Arc<SettingsCache> {
        &self.settings
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticWriter> {
        &self.diagnostics
    }

    pub fn pruner(&self) -> &Arc<RetentionPruner> {
        &self.pruner
    }

    pub fn pipeline(&self) -> &Arc<CapturePipeline> {
        &self.pipeline
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Wraps every route of `router` in the capture middleware.
    pub fn capture<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        capture_layer(router, self.pipeline.clone())
    }

    /// Tracing layer turning application events into diagnostic records,
    /// plus the task that persists them.
    pub fn diagnostic_layer(&self) -> (DiagnosticLayer, JoinHandle<()>) {
        layer::start(self.diagnostics.clone())
    }

    pub fn spawn_retention_worker(&self, tick: Duration) -> RetentionWorker {
        spawn_retention_worker(self.pruner.clone(), tick)
    }

    pub async fn emit(&self, level: Severity, text: impl Into<String>) -> Option<LogId> {
        self.diagnostics.emit(level, text).await
    }

    async fn display_zone(&self) -> DisplayZone {
        DisplayZone::resolve(&self.settings.current().await.display_time_zone)
    }

    pub async fn list_logs(&self, filter: &LogFilter, page: PageRequest) -> Result<LogPage<LogView>> {
        let zone = self.display_zone().await;
        let page = self.repository.list_logs(filter, page).await?;
        Ok(page.map(|record| Localized::new(record, &zone)))
    }

    /// A record together with its correlated children.
    pub async fn get_log(&self, id: &LogId) -> Result<LogDetail> {
        let record = self
            .repository
            .find_log(id)
            .await?
            .ok_or_else(|| CaptureError::NotFound(id.to_string(), crate::gateway::LOGS_COLLECTION.to_string()))?;
        let related = self.repository.find_related(id).await?;
        let zone = self.display_zone().await;
        Ok(LogDetail {
            log: Localized::new(record, &zone),
            related: related
                .into_iter()
                .map(|child| Localized::new(child, &zone))
                .collect(),
        })
    }

    pub async fn delete_all_logs(&self) -> Result<u64> {
        let deleted = self.repository.delete_all_logs().await?;
        info!(deleted, "all captured records deleted");
        Ok(deleted)
    }

    /// Forced prune: bypasses the interval gate, never overlaps a running pass.
    pub async fn run_prune_now(&self) -> PruneOutcome {
        self.pruner.run_now().await
    }

    /// Recounts every bucket and stores a new snapshot. The last-prune
    /// summary of the previous snapshot is carried over.
    pub async fn recalculate_stats(&self) -> Result<StatsView> {
        let mut stats = self.repository.compute_statistics(self.clock.now()).await?;
        if let Some(previous) = self.repository.latest_statistics().await? {
            stats.last_prune = previous.last_prune;
        }
        self.repository.insert_statistics(&stats).await?;
        let zone = self.display_zone().await;
        Ok(Localized::new(stats, &zone))
    }

    pub async fn latest_stats(&self) -> Result<Option<StatsView>> {
        let zone = self.display_zone().await;
        Ok(self
            .repository
            .latest_statistics()
            .await?
            .map(|stats| Localized::new(stats, &zone)))
    }

    pub async fn settings(&self) -> Arc<MonitorSettings> {
        self.settings.current().await
    }

    /// Replaces the configuration record as a whole.
    pub async fn save_settings(&self, mut settings: MonitorSettings) -> Result<Arc<MonitorSettings>> {
        settings.ignore_paths = settings
            .ignore_paths
            .into_iter()
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .collect();
        if settings.max_body_bytes == 0 {
            return Err(CaptureError::InvalidInput(
                "maxBodyBytes must be greater than zero".to_string(),
            ));
        }
        self.settings.replace(settings).await
    }
}
