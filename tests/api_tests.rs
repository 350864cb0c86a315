mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{get as get_request, json_request, send, send_json};
use reqlens::core::{Clock, ManualClock};
use reqlens::gateway::LogRepository;
use reqlens::model::{EnvelopeRecord, LogId, Severity};
use reqlens::storage::{DocumentStore, DurabilityMode};
use reqlens::{DocumentLogRepository, RequestMonitor};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::tempdir;

const API: &str = "/_reqlens/api";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
}

struct Fixture {
    monitor: Arc<RequestMonitor>,
    clock: Arc<ManualClock>,
    app: Router,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(start()));
    let monitor = Arc::new(RequestMonitor::builder().clock(clock.clone()).build());
    let app = reqlens::web::router(monitor.clone());
    Fixture { monitor, clock, app }
}

/// Five roots one minute apart plus one child of the newest.
async fn seed(fixture: &Fixture) -> Vec<LogId> {
    let repo = fixture.monitor.repository();
    let mut ids = Vec::new();
    for n in 0..5 {
        let mut record = EnvelopeRecord::pre_image(
            start() + Duration::minutes(n),
            if n % 2 == 0 { "GET" } else { "POST" },
            &format!("/orders/{n}"),
        );
        record.status_code = Some(if n == 3 { 500 } else { 200 });
        record.is_error = n == 3;
        ids.push(repo.insert_log(&record).await.unwrap());
    }
    let child = EnvelopeRecord::diagnostic(
        start() + Duration::minutes(5),
        Severity::Information,
        "order shipped".to_string(),
        None,
        Some(ids[4].clone()),
    );
    repo.insert_log(&child).await.unwrap();
    ids
}

fn paths(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["path"].as_str().unwrap_or("").to_string())
        .collect()
}

#[tokio::test]
async fn listing_is_newest_first_and_paginated() {
    let fixture = fixture();
    seed(&fixture).await;

    let (status, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?page=2&pageSize=2"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 5);
    assert_eq!(page["page"], 2);
    assert_eq!(page["pageSize"], 2);
    assert_eq!(paths(&page), vec!["/orders/2", "/orders/1"]);
    assert!(page["items"][0]["localTimestamp"].is_string());

    let mut concatenated = Vec::new();
    for n in 1..=3 {
        let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?page={n}&pageSize=2"))).await;
        concatenated.extend(paths(&page));
    }
    let (_, all) = send_json(&fixture.app, get_request(&format!("{API}/logs"))).await;
    assert_eq!(concatenated, paths(&all));
}

#[tokio::test]
async fn malformed_paging_uses_defaults() {
    let fixture = fixture();
    seed(&fixture).await;

    let (status, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?page=zero&pageSize=-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], 1);
    assert_eq!(page["pageSize"], 50);
    assert_eq!(page["items"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn filters_combine_with_and() {
    let fixture = fixture();
    seed(&fixture).await;

    let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?method=post"))).await;
    assert_eq!(paths(&page), vec!["/orders/3", "/orders/1"]);

    let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?url=orders%203"))).await;
    assert_eq!(paths(&page), vec!["/orders/3"]);

    let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?errorsOnly=true"))).await;
    assert_eq!(paths(&page), vec!["/orders/3"]);

    let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?includeChildren=true"))).await;
    assert_eq!(page["total"], 6);
    assert_eq!(page["items"][0]["message"], "order shipped");
}

#[tokio::test]
async fn log_detail_includes_related_children() {
    let fixture = fixture();
    let ids = seed(&fixture).await;

    let (status, detail) = send_json(&fixture.app, get_request(&format!("{API}/logs/{}", ids[4]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["log"]["path"], "/orders/4");
    let related = detail["related"].as_array().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0]["correlationId"], ids[4].as_str());

    let (status, error) = send_json(&fixture.app, get_request(&format!("{API}/logs/missing"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], "not_found");
}

#[tokio::test]
async fn delete_all_empties_the_collection() {
    let fixture = fixture();
    seed(&fixture).await;

    let request = Request::builder().method("DELETE").uri(format!("{API}/logs")).body(Body::empty()).unwrap();
    let (status, body) = send_json(&fixture.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 6);

    let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?includeChildren=true"))).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn forced_prune_bypasses_the_interval() {
    let fixture = fixture();
    let repo = fixture.monitor.repository();
    let expired = EnvelopeRecord::pre_image(start() - Duration::hours(200), "GET", "/ancient");
    repo.insert_log(&expired).await.unwrap();

    let run = || {
        Request::builder()
            .method("POST")
            .uri(format!("{API}/retention/run"))
            .body(Body::empty())
            .unwrap()
    };
    let (status, report) = send_json(&fixture.app, run()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["deleted"], 1);

    fixture.clock.advance(Duration::minutes(1));
    let (_, report) = send_json(&fixture.app, run()).await;
    assert_eq!(report["status"], "completed");
    assert_eq!(report["deleted"], 0);

    let (_, stats) = send_json(&fixture.app, get_request(&format!("{API}/stats"))).await;
    assert_eq!(stats["total"], 0);
    assert_eq!(stats["lastPrune"]["deleted"], 0);
}

#[tokio::test]
async fn recalculated_stats_bucket_every_record() {
    let fixture = fixture();
    seed(&fixture).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("{API}/stats/recalculate"))
        .body(Body::empty())
        .unwrap();
    let (status, stats) = send_json(&fixture.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 6);
    assert_eq!(stats["success"], 4);
    assert_eq!(stats["failure"], 1);
    assert_eq!(stats["diagnostic"], 1);
    assert_eq!(stats["timestamp"], json!(fixture.clock.now()));
}

#[tokio::test]
async fn settings_are_replaced_as_a_whole() {
    let fixture = fixture();
    seed(&fixture).await;

    let (status, settings) = send_json(&fixture.app, get_request(&format!("{API}/settings"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["captureHttp"], true);
    assert_eq!(settings["retention"]["maxAgeHours"], 168);

    let update = json!({
        "ignorePaths": ["/health"],
        "retention": { "enabled": false, "intervalHours": 2, "maxAgeHours": 48 },
        "displayTimeZone": "+01:00"
    });
    let (status, saved) = send_json(&fixture.app, json_request("PUT", &format!("{API}/settings"), update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["retention"]["enabled"], false);
    assert_eq!(saved["captureHttp"], true);

    let (_, settings) = send_json(&fixture.app, get_request(&format!("{API}/settings"))).await;
    assert_eq!(settings["ignorePaths"], json!(["/health"]));

    let (_, page) = send_json(&fixture.app, get_request(&format!("{API}/logs?pageSize=1"))).await;
    assert_eq!(page["items"][0]["localTimestamp"], "2024-09-01T09:04:00+01:00");

    let invalid = json!({ "maxBodyBytes": 0 });
    let (status, error) = send_json(&fixture.app, json_request("PUT", &format!("{API}/settings"), invalid)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["code"], "input_error");
}

#[tokio::test]
async fn records_survive_a_restart() {
    let dir = tempdir().unwrap();

    {
        let store = DocumentStore::open(dir.path(), DurabilityMode::Sync).unwrap();
        let repo = Arc::new(DocumentLogRepository::new(Arc::new(store)));
        let monitor = Arc::new(RequestMonitor::builder().repository(repo).build());
        monitor.save_settings(common::quiet_settings()).await.unwrap();
        let app = monitor.capture(Router::new().route("/ping", get(|| async { "pong" })));
        let (status, body) = send(&app, get_request("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"pong");
    }

    let store = DocumentStore::open(dir.path(), DurabilityMode::Sync).unwrap();
    let repo = Arc::new(DocumentLogRepository::new(Arc::new(store)));
    let monitor = Arc::new(RequestMonitor::builder().repository(repo).build());
    let app = reqlens::web::router(monitor);
    let (_, page) = send_json(&app, get_request(&format!("{API}/logs"))).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["path"], "/ping");
    assert_eq!(page["items"][0]["responseBody"], "pong");
}
