use super::LogRepository;
use crate::core::Result;
use crate::model::MonitorSettings;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Lazily loaded, in-memory copy of the configuration record.
pub struct SettingsCache {
    repository: Arc<dyn LogRepository>,
    cached: RwLock<Option<Arc<MonitorSettings>>>,
}

impl SettingsCache {
    pub fn new(repository: Arc<dyn LogRepository>) -> Self {
        Self {
            repository,
            cached: RwLock::new(None),
        }
    }

    /// Current settings. The record is created with defaults on first use;
    /// while the store is unreachable, defaults are served without caching.
    pub async fn current(&self) -> Arc<MonitorSettings> {
        if let Some(settings) = self.cached.read().await.as_ref() {
            return Arc::clone(settings);
        }

        let mut cached = self.cached.write().await;
        if let Some(settings) = cached.as_ref() {
            return Arc::clone(settings);
        }
        match self.load_or_create().await {
            Ok(settings) => {
                let settings = Arc::new(settings);
                *cached = Some(Arc::clone(&settings));
                settings
            }
            Err(err) => {
                warn!(error = %err, "configuration record unavailable, using defaults");
                Arc::new(MonitorSettings::default())
            }
        }
    }

    async fn load_or_create(&self) -> Result<MonitorSettings> {
        if let Some(settings) = self.repository.load_settings().await? {
            return Ok(settings);
        }
        let settings = MonitorSettings::default();
        self.repository.save_settings(&settings).await?;
        Ok(settings)
    }

    /// Replaces the persisted record, then the cached copy.
    pub async fn replace(&self, settings: MonitorSettings) -> Result<Arc<MonitorSettings>> {
        self.repository.save_settings(&settings).await?;
        let settings = Arc::new(settings);
        *self.cached.write().await = Some(Arc::clone(&settings));
        Ok(settings)
    }

    /// Forgets the cached copy so the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
