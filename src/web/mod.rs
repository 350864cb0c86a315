//! JSON API over the monitor facade.
//!
//! Mounted under `<base_path>/api`:
//!
//! | Method | Path                  | Operation                      |
//! |--------|-----------------------|--------------------------------|
//! | GET    | `/logs`               | filtered, paginated listing    |
//! | GET    | `/logs/:id`           | record plus related children   |
//! | DELETE | `/logs`               | delete every record            |
//! | POST   | `/retention/run`      | forced prune                   |
//! | GET    | `/stats`              | latest statistics snapshot     |
//! | POST   | `/stats/recalculate`  | full recount                   |
//! | GET    | `/settings`           | configuration record           |
//! | PUT    | `/settings`           | replace configuration record   |

use crate::core::CaptureError;
use crate::facade::{LogDetail, LogView, RequestMonitor, StatsView};
use crate::gateway::{LogFilter, LogPage, PageRequest};
use crate::model::{LogId, MonitorSettings};
use crate::pipeline::own_prefix;
use crate::retention::{PruneOutcome, PruneSkip};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Capture(CaptureError),
}

impl From<CaptureError> for WebError {
    fn from(err: CaptureError) -> Self {
        WebError::Capture(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Capture(CaptureError::NotFound(id, collection)) => (
                StatusCode::NOT_FOUND,
                format!("Record '{}' not found in collection '{}'", id, collection),
                "not_found",
            ),
            WebError::Capture(CaptureError::InvalidInput(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg, "input_error")
            }
            WebError::Capture(CaptureError::ImmutableRecord(id)) => (
                StatusCode::CONFLICT,
                format!("Child record '{}' is write-once", id),
                "conflict",
            ),
            WebError::Capture(err @ CaptureError::StoreClosed) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), "store_unavailable")
            }
            WebError::Capture(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "storage_error",
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// Mount point of the API for a monitor served under `base_path`.
pub fn api_prefix(base_path: &str) -> String {
    let base = own_prefix(base_path);
    if base.eq_ignore_ascii_case("/api") {
        base
    } else {
        format!("{base}/api")
    }
}

/// Router serving the API under `<base_path>/api`.
pub fn router(monitor: Arc<RequestMonitor>) -> Router {
    let prefix = api_prefix(monitor.base_path());
    Router::new().nest(&prefix, api_routes()).with_state(monitor)
}

/// The API routes without a mount prefix.
pub fn api_routes() -> Router<Arc<RequestMonitor>> {
    Router::new()
        .route("/logs", get(list_logs).delete(delete_logs))
        .route("/logs/:id", get(get_log))
        .route("/retention/run", post(run_retention))
        .route("/stats", get(latest_stats))
        .route("/stats/recalculate", post(recalculate_stats))
        .route("/settings", get(get_settings).put(put_settings))
}

fn flag(params: &HashMap<String, String>, key: &str) -> Option<bool> {
    params.get(key).and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    })
}

fn non_empty(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(str::to_string)
}

/// Lenient filter parse: unreadable values are treated as absent.
pub fn filter_from_params(params: &HashMap<String, String>) -> LogFilter {
    let mut filter = LogFilter::default();
    filter.method = non_empty(params, "method");
    filter.url = non_empty(params, "url");
    filter.status_code = params
        .get("statusCode")
        .and_then(|raw| raw.trim().parse::<u16>().ok());
    filter.errors_only = flag(params, "errorsOnly").unwrap_or(false);
    if let Some(include) = flag(params, "includeChildren") {
        filter.exclude_children = !include;
    }
    if let Some(exclude) = flag(params, "excludeChildren") {
        filter.exclude_children = exclude;
    }
    filter
}

pub fn page_from_params(params: &HashMap<String, String>) -> PageRequest {
    PageRequest::parse(
        params.get("page").map(String::as_str),
        params.get("pageSize").map(String::as_str),
    )
}

async fn list_logs(
    State(monitor): State<Arc<RequestMonitor>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<LogPage<LogView>>> {
    let filter = filter_from_params(&params);
    let page = monitor.list_logs(&filter, page_from_params(&params)).await?;
    Ok(Json(page))
}

async fn get_log(
    State(monitor): State<Arc<RequestMonitor>>,
    Path(id): Path<String>,
) -> Result<Json<LogDetail>> {
    Ok(Json(monitor.get_log(&LogId::new(id)).await?))
}

async fn delete_logs(State(monitor): State<Arc<RequestMonitor>>) -> Result<Json<Value>> {
    let deleted = monitor.delete_all_logs().await?;
    Ok(Json(json!({ "deleted": deleted })))
}

fn prune_report(outcome: PruneOutcome) -> Value {
    match outcome {
        PruneOutcome::Completed { cutoff, deleted } => {
            json!({ "status": "completed", "cutoff": cutoff, "deleted": deleted })
        }
        PruneOutcome::Failed { cutoff, message } => {
            json!({ "status": "failed", "cutoff": cutoff, "error": message })
        }
        PruneOutcome::Skipped(reason) => {
            let reason = match reason {
                PruneSkip::AlreadyRunning => "already_running",
                PruneSkip::Disabled => "disabled",
                PruneSkip::TooEarly => "too_early",
            };
            json!({ "status": "skipped", "reason": reason })
        }
    }
}

async fn run_retention(State(monitor): State<Arc<RequestMonitor>>) -> Json<Value> {
    Json(prune_report(monitor.run_prune_now().await))
}

async fn latest_stats(State(monitor): State<Arc<RequestMonitor>>) -> Result<Json<StatsView>> {
    match monitor.latest_stats().await? {
        Some(stats) => Ok(Json(stats)),
        None => Ok(Json(monitor.recalculate_stats().await?)),
    }
}

async fn recalculate_stats(State(monitor): State<Arc<RequestMonitor>>) -> Result<Json<StatsView>> {
    Ok(Json(monitor.recalculate_stats().await?))
}

async fn get_settings(State(monitor): State<Arc<RequestMonitor>>) -> Json<MonitorSettings> {
    Json(monitor.settings().await.as_ref().clone())
}

async fn put_settings(
    State(monitor): State<Arc<RequestMonitor>>,
    Json(settings): Json<MonitorSettings>,
) -> Result<Json<MonitorSettings>> {
    let saved = monitor.save_settings(settings).await?;
    Ok(Json(saved.as_ref().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn malformed_paging_falls_back_to_defaults() {
        let page = page_from_params(&params(&[("page", "abc"), ("pageSize", "-3")]));
        assert_eq!(page, PageRequest::default());
    }

    #[test]
    fn filter_params_are_lenient() {
        let filter = filter_from_params(&params(&[
            ("method", " post "),
            ("statusCode", "five hundred"),
            ("errorsOnly", "yes"),
            ("includeChildren", "true"),
        ]));
        assert_eq!(filter.method.as_deref(), Some("post"));
        assert_eq!(filter.status_code, None);
        assert!(filter.errors_only);
        assert!(!filter.exclude_children);
    }

    #[test]
    fn api_lives_under_the_base_path() {
        assert_eq!(api_prefix("/_reqlens"), "/_reqlens/api");
        assert_eq!(api_prefix(""), "/api");
    }

    #[test]
    fn store_outage_maps_to_service_unavailable() {
        let response = WebError::from(CaptureError::StoreClosed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let response = WebError::from(CaptureError::NotFound("x".into(), "logs".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
