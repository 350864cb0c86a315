//! Interval-gated, single-flight deletion of expired envelope records.
//!
//! `try_prune` walks `Idle -> Checking -> Running -> Idle`. The
//! `(last_attempt, running)` pair is the only process-wide shared state of
//! the capture pipeline; it sits behind one mutex that is never held across
//! a store call.

use crate::core::{Clock, Result};
use crate::gateway::{LogRepository, SettingsCache};
use crate::model::PruneSummary;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Why a prune request did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneSkip {
    AlreadyRunning,
    Disabled,
    TooEarly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    Skipped(PruneSkip),
    Completed { cutoff: DateTime<Utc>, deleted: u64 },
    Failed { cutoff: DateTime<Utc>, message: String },
}

impl PruneOutcome {
    pub fn ran(&self) -> bool {
        !matches!(self, PruneOutcome::Skipped(_))
    }
}

#[derive(Debug, Default)]
struct PruneState {
    last_attempt: Option<DateTime<Utc>>,
    running: bool,
}

/// Clears `running` however the pass ends.
struct RunningGuard<'a> {
    state: &'a Mutex<PruneState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.running = false;
    }
}

/// Cutoff below which records are deleted. Ages reaching past the
/// representable range clamp to the earliest instant, so nothing is deleted.
pub fn prune_cutoff(now: DateTime<Utc>, max_age_hours: u32) -> DateTime<Utc> {
    Duration::try_hours(i64::from(max_age_hours))
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct RetentionPruner {
    repository: Arc<dyn LogRepository>,
    settings: Arc<SettingsCache>,
    clock: Arc<dyn Clock>,
    state: Mutex<PruneState>,
}

impl RetentionPruner {
    pub fn new(
        repository: Arc<dyn LogRepository>,
        settings: Arc<SettingsCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            settings,
            clock,
            state: Mutex::new(PruneState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PruneState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.lock().last_attempt
    }

    /// Runs a pass if none is in flight, retention is enabled and the
    /// configured interval has elapsed since the last attempt.
    pub async fn try_prune(&self) -> PruneOutcome {
        let settings = self.settings.current().await;
        let retention = &settings.retention;
        let now = self.clock.now();

        {
            let mut state = self.lock();
            if state.running {
                return PruneOutcome::Skipped(PruneSkip::AlreadyRunning);
            }
            if !retention.enabled {
                return PruneOutcome::Skipped(PruneSkip::Disabled);
            }
            let interval = Duration::hours(i64::from(retention.interval_hours));
            if let Some(last) = state.last_attempt {
                if now - last < interval {
                    return PruneOutcome::Skipped(PruneSkip::TooEarly);
                }
            }
            state.running = true;
            state.last_attempt = Some(now);
        }

        let _running = RunningGuard { state: &self.state };
        self.run(now, retention.max_age_hours).await
    }

    /// Runs a pass now, ignoring the interval gate and the enabled flag.
    /// Still refuses to overlap a pass already in flight.
    pub async fn run_now(&self) -> PruneOutcome {
        let settings = self.settings.current().await;
        let now = self.clock.now();

        {
            let mut state = self.lock();
            if state.running {
                return PruneOutcome::Skipped(PruneSkip::AlreadyRunning);
            }
            state.running = true;
            state.last_attempt = Some(now);
        }

        let _running = RunningGuard { state: &self.state };
        self.run(now, settings.retention.max_age_hours).await
    }

    async fn run(&self, now: DateTime<Utc>, max_age_hours: u32) -> PruneOutcome {
        let cutoff = prune_cutoff(now, max_age_hours);
        debug!(%cutoff, "retention pass started");
        match self.prune_once(now, cutoff).await {
            Ok(deleted) => {
                info!(%cutoff, deleted, "retention pass finished");
                PruneOutcome::Completed { cutoff, deleted }
            }
            Err(err) => {
                warn!(%cutoff, error = %err, "retention pass failed");
                PruneOutcome::Failed {
                    cutoff,
                    message: err.to_string(),
                }
            }
        }
    }

    async fn prune_once(&self, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self.repository.delete_logs_older_than(cutoff).await?;
        let mut stats = self.repository.compute_statistics(now).await?;
        stats.last_prune = Some(PruneSummary {
            timestamp: now,
            deleted,
        });
        self.repository.insert_statistics(&stats).await?;
        Ok(deleted)
    }
}
