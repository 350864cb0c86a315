//! The capture pipeline: pre-image, downstream dispatch, post-image.
//!
//! Every non-ignored request gets exactly one root record written before the
//! handler runs and exactly one further update: the post-image when a
//! response comes back, the error image when the handler panics or the
//! request future is dropped before the final write starts. Capture failures are logged and swallowed; the
//! response sent to the client is the one the handler produced.

use super::body::{serialize_headers, snapshot_body};
use super::ignore::should_ignore;
use super::labels::RouteLabels;
use crate::core::Clock;
use crate::correlation::RequestContext;
use crate::gateway::{LogRepository, SettingsCache};
use crate::model::{EnvelopeRecord, LogId};
use crate::retention::RetentionPruner;
use axum::Router;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use futures::FutureExt;
use http::request::Parts;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const ABORTED_MESSAGE: &str = "request aborted before completion";
const UNKNOWN_PANIC: &str = "handler panicked";
const FALLBACK_ERROR_STATUS: u16 = 500;

pub struct CapturePipeline {
    repository: Arc<dyn LogRepository>,
    settings: Arc<SettingsCache>,
    pruner: Arc<RetentionPruner>,
    clock: Arc<dyn Clock>,
    base_path: String,
    service_name: Option<String>,
}

/// Attaches the capture middleware to every route of `router`, plus the
/// route-layer that resolves controller/action labels.
pub fn capture_layer<S>(router: Router<S>, pipeline: Arc<CapturePipeline>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route_layer(middleware::from_fn(super::labels::route_labels))
        .layer(middleware::from_fn_with_state(pipeline, capture))
}

/// axum middleware entry point.
pub async fn capture(
    State(pipeline): State<Arc<CapturePipeline>>,
    request: Request,
    next: Next,
) -> Response {
    pipeline.handle(request, next).await
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        UNKNOWN_PANIC.to_string()
    }
}

/// Client address: the socket peer when the server exposes it, else the
/// first `x-forwarded-for` entry.
pub fn client_address(parts: &Parts) -> Option<String> {
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip().to_string());
    }
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Error image for a root that never produced a response.
fn error_image(
    mut root: EnvelopeRecord,
    context: &RequestContext,
    message: String,
    elapsed: Duration,
) -> EnvelopeRecord {
    root.is_error = true;
    root.error_message = Some(message);
    root.status_code = Some(root.status_code.unwrap_or(FALLBACK_ERROR_STATUS));
    root.execution_ms = Some(elapsed_ms(elapsed));
    root.queries = context.queries().drain();
    root
}

struct ArmedImage {
    root: EnvelopeRecord,
    context: RequestContext,
    started: Instant,
}

/// Writes the error image of a root whose request future is dropped before
/// its final write was handed off.
struct ImageGuard {
    repository: Arc<dyn LogRepository>,
    armed: Option<ArmedImage>,
}

impl ImageGuard {
    fn disarm(&mut self) {
        self.armed = None;
    }
}

impl Drop for ImageGuard {
    fn drop(&mut self) {
        let Some(ArmedImage {
            root,
            context,
            started,
        }) = self.armed.take()
        else {
            return;
        };
        let image = error_image(root, &context, ABORTED_MESSAGE.to_string(), started.elapsed());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(id = ?image.id, "no runtime to persist final image of dropped request");
            return;
        };
        let repository = self.repository.clone();
        runtime.spawn(async move {
            if let Err(err) = repository.update_log(&image).await {
                warn!(error = %err, id = ?image.id, "failed to persist final image of dropped request");
            }
        });
    }
}

impl CapturePipeline {
    pub fn new(
        repository: Arc<dyn LogRepository>,
        settings: Arc<SettingsCache>,
        pruner: Arc<RetentionPruner>,
        clock: Arc<dyn Clock>,
        base_path: impl Into<String>,
        service_name: Option<String>,
    ) -> Self {
        Self {
            repository,
            settings,
            pruner,
            clock,
            base_path: base_path.into(),
            service_name,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub async fn handle(&self, request: Request, next: Next) -> Response {
        let settings = self.settings.current().await;
        if !settings.capture_http || should_ignore(request.uri().path(), &settings, &self.base_path) {
            return next.run(request).await;
        }

        let (mut request, pre_image) = self.pre_image(request, settings.max_body_bytes).await;
        let root_id = match self.repository.insert_log(&pre_image).await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, path = ?pre_image.path, "failed to persist request pre-image");
                let response = next.run(request).await;
                self.signal_pruner();
                return response;
            }
        };

        let context = RequestContext::new();
        context.register(root_id.clone(), &pre_image);
        request.extensions_mut().insert(context.clone());
        let matched = request
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string());
        let method = request.method().as_str().to_string();

        let mut root = pre_image;
        root.id = Some(root_id.clone());
        let started = Instant::now();
        let mut guard = ImageGuard {
            repository: self.repository.clone(),
            armed: Some(ArmedImage {
                root: root.clone(),
                context: context.clone(),
                started,
            }),
        };

        let outcome = AssertUnwindSafe(context.clone().scope(next.run(request)))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                let (body, response_body) = snapshot_body(body, settings.max_body_bytes).await;
                let labels = parts
                    .extensions
                    .remove::<RouteLabels>()
                    .or_else(|| matched.map(|template| RouteLabels::from_route(&method, &template)));

                root.status_code = Some(parts.status.as_u16());
                root.response_body = response_body;
                root.execution_ms = Some(elapsed_ms(elapsed));
                if let Some(labels) = labels {
                    root.controller = Some(labels.controller);
                    root.action = Some(labels.action);
                }
                root.queries = context.queries().drain();

                self.write_final(&mut guard, root_id, root).await;
                self.signal_pruner();
                Response::from_parts(parts, body)
            }
            Err(payload) => {
                let image = error_image(root, &context, panic_message(payload.as_ref()), elapsed);
                self.write_final(&mut guard, root_id, image).await;
                self.signal_pruner();
                std::panic::resume_unwind(payload)
            }
        }
    }

    async fn pre_image(&self, request: Request, max_body_bytes: usize) -> (Request, EnvelopeRecord) {
        let (parts, body) = request.into_parts();
        let mut record =
            EnvelopeRecord::pre_image(self.clock.now(), parts.method.as_str(), parts.uri.path());
        record.query_string = parts.uri.query().map(str::to_string);
        record.request_headers = serialize_headers(&parts.headers);
        record.client_ip = client_address(&parts);
        record.service_name = self.service_name.clone();

        let (body, captured) = snapshot_body(body, max_body_bytes).await;
        record.request_body = captured;
        (Request::from_parts(parts, body), record)
    }

    /// Hands the final image to a detached task, so the single update
    /// completes even if this request future is dropped while waiting.
    async fn write_final(&self, guard: &mut ImageGuard, id: LogId, image: EnvelopeRecord) {
        guard.disarm();
        let repository = self.repository.clone();
        let write = tokio::spawn(async move {
            match repository.update_log(&image).await {
                Ok(()) => debug!(%id, status = ?image.status_code, "request captured"),
                Err(err) => warn!(error = %err, %id, "failed to persist request post-image"),
            }
        });
        if let Err(err) = write.await {
            warn!(error = %err, "post-image write task failed");
        }
    }

    fn signal_pruner(&self) {
        let pruner = self.pruner.clone();
        tokio::spawn(async move {
            let outcome = pruner.try_prune().await;
            debug!(?outcome, "retention check after request");
        });
    }
}
