//! Request-scoped context: the active root and the query buffer.
//!
//! The context travels explicitly (request extensions, function arguments)
//! and is also installed as task-local state for the duration of the
//! downstream handler, so code that cannot be handed the value can still
//! find it with [`RequestContext::current`]. Work spawned onto other tasks
//! must re-enter it with [`RequestContext::scope`].

use crate::interceptor::QueryCollector;
use crate::model::{EnvelopeRecord, LogId};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

tokio::task_local! {
    static CURRENT_REQUEST: RequestContext;
}

/// Identity of the root envelope of the request in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoot {
    pub id: LogId,
    pub timestamp: DateTime<Utc>,
    pub method: Option<String>,
    pub path: Option<String>,
}

#[derive(Default)]
struct ContextInner {
    root: OnceLock<ActiveRoot>,
    queries: QueryCollector,
}

#[derive(Clone, Default)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("root", &self.inner.root.get())
            .field("queries", &self.inner.queries.len())
            .finish()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the persisted root of this request. Only the first
    /// registration takes effect.
    pub fn register(&self, id: LogId, root: &EnvelopeRecord) -> bool {
        self.inner
            .root
            .set(ActiveRoot {
                id,
                timestamp: root.timestamp,
                method: root.method.clone(),
                path: root.path.clone(),
            })
            .is_ok()
    }

    pub fn root(&self) -> Option<&ActiveRoot> {
        self.inner.root.get()
    }

    pub fn root_id(&self) -> Option<LogId> {
        self.root().map(|root| root.id.clone())
    }

    pub fn queries(&self) -> &QueryCollector {
        &self.inner.queries
    }

    /// The context installed on the current task, if any.
    pub fn current() -> Option<RequestContext> {
        CURRENT_REQUEST.try_with(Clone::clone).ok()
    }

    /// Root registered for the request in flight on the current task.
    pub fn current_root() -> Option<ActiveRoot> {
        CURRENT_REQUEST
            .try_with(|context| context.root().cloned())
            .ok()
            .flatten()
    }

    /// Runs `future` with this context installed as the current one.
    pub async fn scope<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_REQUEST.scope(self, future).await
    }

    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_REQUEST.sync_scope(self, f)
    }
}
