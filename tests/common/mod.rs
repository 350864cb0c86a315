#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use reqlens::core::Result;
use reqlens::gateway::{DocumentLogRepository, LogFilter, LogPage, LogRepository, PageRequest};
use reqlens::model::{EnvelopeRecord, LogId, MonitorSettings, StatisticsRecord};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

/// Repository wrapper counting writes to roots. Updates can be parked
/// until released.
pub struct CountingRepository {
    pub inner: Arc<DocumentLogRepository>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    hold_updates: AtomicBool,
    pub update_entered: Notify,
    pub update_release: Notify,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DocumentLogRepository::in_memory()),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            hold_updates: AtomicBool::new(false),
            update_entered: Notify::new(),
            update_release: Notify::new(),
        }
    }

    /// Every later update waits for `update_release`.
    pub fn hold_updates(&self) {
        self.hold_updates.store(true, Ordering::SeqCst);
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogRepository for CountingRepository {
    async fn insert_log(&self, record: &EnvelopeRecord) -> Result<LogId> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_log(record).await
    }

    async fn update_log(&self, record: &EnvelopeRecord) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.hold_updates.load(Ordering::SeqCst) {
            self.update_entered.notify_one();
            self.update_release.notified().await;
        }
        self.inner.update_log(record).await
    }

    async fn find_log(&self, id: &LogId) -> Result<Option<EnvelopeRecord>> {
        self.inner.find_log(id).await
    }

    async fn find_related(&self, id: &LogId) -> Result<Vec<EnvelopeRecord>> {
        self.inner.find_related(id).await
    }

    async fn list_logs(&self, filter: &LogFilter, page: PageRequest) -> Result<LogPage<EnvelopeRecord>> {
        self.inner.list_logs(filter, page).await
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64> {
        self.inner.count_logs(filter).await
    }

    async fn delete_all_logs(&self) -> Result<u64> {
        self.inner.delete_all_logs().await
    }

    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.delete_logs_older_than(cutoff).await
    }

    async fn compute_statistics(&self, at: DateTime<Utc>) -> Result<StatisticsRecord> {
        self.inner.compute_statistics(at).await
    }

    async fn insert_statistics(&self, stats: &StatisticsRecord) -> Result<()> {
        self.inner.insert_statistics(stats).await
    }

    async fn latest_statistics(&self) -> Result<Option<StatisticsRecord>> {
        self.inner.latest_statistics().await
    }

    async fn load_settings(&self) -> Result<Option<MonitorSettings>> {
        self.inner.load_settings().await
    }

    async fn save_settings(&self, settings: &MonitorSettings) -> Result<()> {
        self.inner.save_settings(settings).await
    }
}

/// Repository whose age-based delete parks until released, holding a
/// retention pass in flight.
pub struct GatedRepository {
    pub inner: Arc<DocumentLogRepository>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedRepository {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DocumentLogRepository::in_memory()),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl LogRepository for GatedRepository {
    async fn insert_log(&self, record: &EnvelopeRecord) -> Result<LogId> {
        self.inner.insert_log(record).await
    }

    async fn update_log(&self, record: &EnvelopeRecord) -> Result<()> {
        self.inner.update_log(record).await
    }

    async fn find_log(&self, id: &LogId) -> Result<Option<EnvelopeRecord>> {
        self.inner.find_log(id).await
    }

    async fn find_related(&self, id: &LogId) -> Result<Vec<EnvelopeRecord>> {
        self.inner.find_related(id).await
    }

    async fn list_logs(&self, filter: &LogFilter, page: PageRequest) -> Result<LogPage<EnvelopeRecord>> {
        self.inner.list_logs(filter, page).await
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64> {
        self.inner.count_logs(filter).await
    }

    async fn delete_all_logs(&self) -> Result<u64> {
        self.inner.delete_all_logs().await
    }

    async fn delete_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.delete_logs_older_than(cutoff).await
    }

    async fn compute_statistics(&self, at: DateTime<Utc>) -> Result<StatisticsRecord> {
        self.inner.compute_statistics(at).await
    }

    async fn insert_statistics(&self, stats: &StatisticsRecord) -> Result<()> {
        self.inner.insert_statistics(stats).await
    }

    async fn latest_statistics(&self) -> Result<Option<StatisticsRecord>> {
        self.inner.latest_statistics().await
    }

    async fn load_settings(&self) -> Result<Option<MonitorSettings>> {
        self.inner.load_settings().await
    }

    async fn save_settings(&self, settings: &MonitorSettings) -> Result<()> {
        self.inner.save_settings(settings).await
    }
}

/// Settings used by the pipeline tests: retention off so no background pass
/// races the assertions.
pub fn quiet_settings() -> MonitorSettings {
    let mut settings = MonitorSettings::default();
    settings.retention.enabled = false;
    settings
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, bytes.to_vec())
}

pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("valid request")
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
