//! ApprovalBridge: correlates a waiting task with the human decision recorded
//! by the external approval processor.
//!
//! Correlation is by the original file name only. A name found in more than
//! one approval folder is logged; the first folder in decision order wins.
//!
//! `wait_for_approval` blocks its caller. It wakes on folder changes reported
//! by an [`ApprovalWatch`], on every poll interval, and at least every
//! [`CANCEL_CHECK`] so a [`CancelToken`] is honoured promptly.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::types::{ApprovalStatus, TaskStatus, WaitDecision};
use crate::error::{RalphError, Result};
use crate::io::approval_dirs::{ApprovalDirs, ApprovalWatch, Wake};
use crate::io::state_store::StateStore;

/// Upper bound on how long a wait sleeps between cancellation checks.
pub const CANCEL_CHECK: Duration = Duration::from_millis(100);

/// Shared flag that ends an in-flight approval wait early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the token can guard the next wait.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalCheck {
    pub task_id: String,
    pub status: ApprovalStatus,
    pub filename: String,
    /// File holding the decision, when one was found.
    pub location: Option<PathBuf>,
    /// Modification time of that file.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitOutcome {
    pub task_id: String,
    pub decision: WaitDecision,
    pub waited_seconds: f64,
    pub location: Option<PathBuf>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ApprovalBridge {
    states: StateStore,
    dirs: ApprovalDirs,
}

impl ApprovalBridge {
    pub fn new(states: StateStore, dirs: ApprovalDirs) -> Self {
        Self { states, dirs }
    }

    pub fn check_status(&self, task_id: &str) -> Result<ApprovalCheck> {
        let state = self.states.load(task_id)?;
        let filename = state
            .original_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut check = ApprovalCheck {
            task_id: state.task_id,
            status: ApprovalStatus::NotWaiting,
            filename,
            location: None,
            timestamp: None,
        };
        if state.status != TaskStatus::WaitingApproval {
            return Ok(check);
        }

        let mut hits = self.dirs.locate(&check.filename).into_iter();
        match hits.next() {
            Some(hit) => {
                let others: Vec<String> = hits.map(|h| h.path.display().to_string()).collect();
                if !others.is_empty() {
                    warn!(
                        task_id = %check.task_id,
                        filename = %check.filename,
                        used = %hit.path.display(),
                        ?others,
                        "approval file name found in several folders"
                    );
                }
                check.status = hit.folder;
                check.location = Some(hit.path);
                check.timestamp = Some(hit.modified);
            }
            None => check.status = ApprovalStatus::NotFound,
        }
        debug!(task_id = %check.task_id, status = ?check.status, "approval checked");
        Ok(check)
    }

    /// Block until the task is approved or rejected, the timeout elapses, or
    /// `cancel` fires. Timeout and cancellation are outcomes, not errors.
    pub fn wait_for_approval(
        &self,
        task_id: &str,
        options: &WaitOptions,
        cancel: &CancelToken,
    ) -> Result<WaitOutcome> {
        if options.poll_interval.is_zero() {
            return Err(RalphError::invalid("poll_interval must be positive"));
        }
        let started = Instant::now();
        // `None` when the timeout is past what `Instant` can represent.
        let deadline = started.checked_add(options.timeout);
        let finish = |decision: WaitDecision, check: Option<ApprovalCheck>| {
            let (location, timestamp) = check
                .map(|c| (c.location, c.timestamp))
                .unwrap_or_default();
            let outcome = WaitOutcome {
                task_id: task_id.to_string(),
                decision,
                waited_seconds: round_secs(started.elapsed()),
                location,
                timestamp,
            };
            info!(task_id, decision = ?outcome.decision, waited = outcome.waited_seconds, "approval wait finished");
            outcome
        };

        let check = self.check_status(task_id)?;
        if let Some(decision) = decided(&check) {
            return Ok(finish(decision, Some(check)));
        }

        let mut watch = self.open_watch(options.poll_interval);
        let mut next_poll = Instant::now().checked_add(options.poll_interval);
        loop {
            if cancel.is_cancelled() {
                return Ok(finish(WaitDecision::Cancelled, None));
            }
            let now = Instant::now();
            let mut slice = CANCEL_CHECK;
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Ok(finish(WaitDecision::Timeout, None));
                }
                slice = slice.min(deadline - now);
            }
            if let Some(next_poll) = next_poll {
                slice = slice.min(next_poll.saturating_duration_since(now));
            }

            let wake = match &watch {
                Some(w) => w.wait(slice),
                None => {
                    thread::sleep(slice);
                    Wake::Idle
                }
            };
            if wake == Wake::Disconnected {
                warn!(task_id, "approval watcher stopped; polling instead");
                watch = None;
            }

            let poll_due = next_poll.is_some_and(|at| Instant::now() >= at);
            if wake == Wake::Changed || poll_due {
                let check = self.check_status(task_id)?;
                if let Some(decision) = decided(&check) {
                    return Ok(finish(decision, Some(check)));
                }
                next_poll = Instant::now().checked_add(options.poll_interval);
            }
        }
    }

    fn open_watch(&self, poll_interval: Duration) -> Option<ApprovalWatch> {
        match self.dirs.watch(poll_interval) {
            Ok(watch) => Some(watch),
            Err(err) => {
                warn!(error = %err, "approval watcher unavailable; polling instead");
                None
            }
        }
    }
}

fn decided(check: &ApprovalCheck) -> Option<WaitDecision> {
    match check.status {
        ApprovalStatus::Approved => Some(WaitDecision::Approved),
        ApprovalStatus::Rejected => Some(WaitDecision::Rejected),
        _ => None,
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
