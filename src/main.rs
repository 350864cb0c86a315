use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use reqlens::config::AppConfig;
use reqlens::{
    Command, CommandExecutor, ConnectionInfo, DocumentLogRepository, DocumentStore,
    InterceptedExecutor, RequestMonitor,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Events under this target are captured as diagnostic records.
const DEMO_TARGET: &str = "demo_app";

/// Stand-in driver so the demo routes have commands to intercept.
struct MemoryOrders {
    connection: ConnectionInfo,
    rows: Mutex<Vec<Value>>,
}

#[async_trait]
impl CommandExecutor for MemoryOrders {
    type Output = Vec<Value>;
    type Error = String;

    fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    async fn execute(&self, command: &Command) -> std::result::Result<Vec<Value>, String> {
        let mut rows = self.rows.lock().await;
        if command.text.starts_with("INSERT") {
            let row = command
                .parameters
                .get("order")
                .cloned()
                .ok_or_else(|| "missing order parameter".to_string())?;
            rows.push(row.clone());
            Ok(vec![row])
        } else {
            Ok(rows.clone())
        }
    }
}

type Orders = Arc<InterceptedExecutor<MemoryOrders>>;

#[derive(Debug, Deserialize)]
struct NewOrder {
    item: String,
    quantity: u32,
}

async fn list_orders(State(orders): State<Orders>) -> Json<Vec<Value>> {
    info!(target: DEMO_TARGET, "listing orders");
    let rows = orders
        .execute(&Command::read("SELECT * FROM orders").caller("orders.list"))
        .await
        .unwrap_or_default();
    Json(rows)
}

async fn create_order(State(orders): State<Orders>, Json(order): Json<NewOrder>) -> Json<Value> {
    let row = json!({ "item": order.item, "quantity": order.quantity });
    let command = Command::write("INSERT INTO orders (item, quantity) VALUES (@item, @quantity)")
        .param("order", row.clone())
        .caller("orders.create");
    match orders.execute(&command).await {
        Ok(_) => info!(target: DEMO_TARGET, item = %order.item, "order created"),
        Err(err) => warn!(target: DEMO_TARGET, error = %err, "order rejected"),
    }
    Json(row)
}

async fn fail_order(Path(id): Path<u32>) -> Json<Value> {
    error!(target: DEMO_TARGET, id, "order lookup is about to fail [source: demo.fail_order]");
    panic!("order {id} is corrupted");
}

fn demo_routes(orders: Orders) -> Router {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id/fail", get(fail_order))
        .with_state(orders)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let store = match &config.data_dir {
        Some(dir) => DocumentStore::open(dir, config.durability)
            .with_context(|| format!("failed to open document store at {}", dir.display()))?,
        None => DocumentStore::in_memory(),
    };
    let repository = Arc::new(DocumentLogRepository::new(Arc::new(store)));

    let mut builder = RequestMonitor::builder()
        .repository(repository)
        .base_path(config.base_path.clone());
    if let Some(name) = &config.service_name {
        builder = builder.service_name(name.clone());
    }
    let monitor = Arc::new(builder.build());

    let (diagnostics, _diagnostic_writer) = monitor.diagnostic_layer();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reqlens=debug,demo_app=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(diagnostics)
        .init();

    info!(target: DEMO_TARGET, "demo service starting");

    let orders: Orders = Arc::new(InterceptedExecutor::new(MemoryOrders {
        connection: ConnectionInfo::new("memory", "orders"),
        rows: Mutex::new(Vec::new()),
    }));

    let app = monitor
        .capture(demo_routes(orders))
        .merge(reqlens::web::router(monitor.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let worker = config
        .retention_tick
        .map(|tick| monitor.spawn_retention_worker(tick));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, base_path = %monitor.base_path(), "reqlens demo started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some(worker) = worker {
        worker.stop().await.context("failed to stop retention worker")?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
