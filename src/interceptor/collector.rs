//! Per-request buffer of intercepted commands.

use crate::model::QueryRecord;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct PendingQuery {
    record: QueryRecord,
    started: Instant,
    finished: bool,
}

#[derive(Default)]
struct CollectorState {
    queries: Vec<PendingQuery>,
    sealed: bool,
}

/// Buffer owned by one request. Cloning shares the buffer.
#[derive(Clone, Default)]
pub struct QueryCollector {
    state: Arc<Mutex<CollectorState>>,
}

/// Handle used to complete a query once the driver returns.
pub struct QueryTicket {
    collector: QueryCollector,
    index: usize,
    started: Instant,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl QueryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        // A poisoned buffer still holds valid records.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a record with its own running stopwatch. Returns `None` once
    /// the buffer has been drained into a post-image.
    pub fn push(&self, record: QueryRecord) -> Option<QueryTicket> {
        let started = Instant::now();
        let mut state = self.lock();
        if state.sealed {
            return None;
        }
        state.queries.push(PendingQuery {
            record,
            started,
            finished: false,
        });
        Some(QueryTicket {
            collector: self.clone(),
            index: state.queries.len() - 1,
            started,
        })
    }

    fn complete(&self, index: usize, elapsed: Duration, error: Option<String>) {
        let mut state = self.lock();
        if state.sealed {
            return;
        }
        if let Some(pending) = state.queries.get_mut(index) {
            pending.record.duration_ms = millis(elapsed);
            pending.record.success = error.is_none();
            pending.record.error_message = error;
            pending.finished = true;
        }
    }

    /// Takes every buffered record in arrival order and seals the buffer.
    /// Queries still running report their elapsed time so far.
    pub fn drain(&self) -> Vec<QueryRecord> {
        let mut state = self.lock();
        state.sealed = true;
        std::mem::take(&mut state.queries)
            .into_iter()
            .map(|pending| {
                let mut record = pending.record;
                if !pending.finished {
                    record.duration_ms = millis(pending.started.elapsed());
                }
                record
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}

impl QueryTicket {
    /// Stops the stopwatch and records the outcome.
    pub fn finish(self, error: Option<String>) {
        self.collector
            .complete(self.index, self.started.elapsed(), error);
    }
}
