//! The per-task progress record and its pure transitions.
//!
//! Nothing here touches the filesystem: whether the completion target exists is
//! passed in by the caller, so every predicate is deterministic.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::types::{CompletionStrategy, TaskStatus};

const ID_STEM_MAX: usize = 40;
const ID_HASH_CHARS: usize = 12;

/// Persisted progress record for one task (`<state dir>/<task_id>.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RalphState {
    pub task_id: String,
    pub original_path: PathBuf,
    /// Existence of this path signals completion under `file_movement`.
    pub target_path: PathBuf,
    pub prompt: String,
    pub max_iterations: u32,
    /// 1-indexed, never decreases.
    pub current_iteration: u32,
    pub completion_strategy: CompletionStrategy,
    pub status: TaskStatus,
    pub notes: Vec<String>,
    /// Append-only.
    pub history: Vec<HistoryEntry>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every successful write.
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Inputs for a fresh state record.
#[derive(Debug, Clone)]
pub struct NewState {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub prompt: String,
    pub max_iterations: u32,
    pub strategy: CompletionStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    TargetExists,
    PromiseMarker,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub complete: bool,
    pub reason: CompletionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinueReason {
    MaxIterationsReached,
    Complete,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Continuation {
    pub should_continue: bool,
    pub reason: ContinueReason,
    pub current_iteration: u32,
    pub max_iterations: u32,
}

impl RalphState {
    pub fn new(task_id: String, input: NewState, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            original_path: input.original_path,
            target_path: input.target_path,
            prompt: input.prompt,
            max_iterations: input.max_iterations,
            current_iteration: 1,
            completion_strategy: input.strategy,
            status: TaskStatus::InProgress,
            notes: Vec::new(),
            history: Vec::new(),
            started_at: now,
            updated_at: now,
            archived_at: None,
            version: 1,
        }
    }

    /// Set the status and append a history entry for the current iteration.
    pub fn record_progress(&mut self, status: TaskStatus, notes: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        if let Some(note) = notes.as_ref().filter(|n| !n.trim().is_empty()) {
            self.notes.push(note.clone());
        }
        self.history.push(HistoryEntry {
            iteration: self.current_iteration,
            timestamp: now,
            status,
            notes,
        });
        self.updated_at = now;
    }

    /// Advance the iteration counter and return the new value.
    pub fn increment(&mut self, now: DateTime<Utc>) -> u32 {
        self.current_iteration = self.current_iteration.saturating_add(1);
        self.updated_at = now;
        self.current_iteration
    }

    pub fn budget_exhausted(&self) -> bool {
        self.current_iteration >= self.max_iterations
    }

    /// Stuck: iteration budget exhausted or explicitly blocked.
    pub fn is_stuck(&self) -> bool {
        self.budget_exhausted() || self.status == TaskStatus::Blocked
    }

    /// Evaluate completion. `target_exists` wins over the stored status.
    pub fn completion(&self, target_exists: bool, marker: &str) -> Completion {
        match self.completion_strategy {
            CompletionStrategy::FileMovement if target_exists => Completion {
                complete: true,
                reason: CompletionReason::TargetExists,
            },
            CompletionStrategy::Promise if self.latest_entry_has_marker(marker) => Completion {
                complete: true,
                reason: CompletionReason::PromiseMarker,
            },
            _ => Completion {
                complete: false,
                reason: CompletionReason::Incomplete,
            },
        }
    }

    /// Loop guard: false once the budget is spent or the task is complete.
    pub fn continuation(&self, completion: &Completion) -> Continuation {
        let reason = if self.budget_exhausted() {
            ContinueReason::MaxIterationsReached
        } else if completion.complete {
            ContinueReason::Complete
        } else {
            ContinueReason::Continue
        };
        Continuation {
            should_continue: reason == ContinueReason::Continue,
            reason,
            current_iteration: self.current_iteration,
            max_iterations: self.max_iterations,
        }
    }

    fn latest_entry_has_marker(&self, marker: &str) -> bool {
        self.history
            .last()
            .and_then(|entry| entry.notes.as_deref())
            .is_some_and(|notes| notes.contains(marker))
    }
}

/// Derive a stable id from the original path: `<stem>-<sha256 prefix>`.
///
/// The same path always yields the same id, so a second `create` for a task
/// that is still active is detectable.
pub fn derive_task_id(original_path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original_path.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());

    let stem = original_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut slug: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    slug.truncate(ID_STEM_MAX);
    if slug.is_empty() {
        slug.push_str("task");
    }
    format!("{slug}-{}", &digest[..ID_HASH_CHARS])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_state;

    const MARKER: &str = "<promise>TASK_COMPLETE</promise>";

    #[test]
    fn new_state_starts_at_iteration_one_in_progress() {
        let state = sample_state("a", 10);
        assert_eq!(state.current_iteration, 1);
        assert_eq!(state.status, TaskStatus::InProgress);
        assert_eq!(state.version, 1);
        assert!(state.history.is_empty());
    }

    #[test]
    fn n_increments_yield_one_plus_n() {
        let mut state = sample_state("a", 10);
        for _ in 0..7 {
            state.increment(Utc::now());
        }
        assert_eq!(state.current_iteration, 8);
    }

    #[test]
    fn continuation_stops_at_budget_regardless_of_status() {
        for status in [
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::WaitingApproval,
        ] {
            let mut state = sample_state("a", 2);
            state.status = status;
            state.increment(Utc::now());
            let completion = state.completion(false, MARKER);
            let cont = state.continuation(&completion);
            assert!(!cont.should_continue);
            assert_eq!(cont.reason, ContinueReason::MaxIterationsReached);
        }
    }

    #[test]
    fn target_existence_beats_stored_status() {
        let state = sample_state("a", 5);
        assert_eq!(state.status, TaskStatus::InProgress);
        let completion = state.completion(true, MARKER);
        assert!(completion.complete);
        assert_eq!(completion.reason, CompletionReason::TargetExists);
        let cont = state.continuation(&completion);
        assert_eq!(cont.reason, ContinueReason::Complete);
    }

    #[test]
    fn promise_marker_only_counts_in_latest_entry() {
        let mut state = sample_state("a", 5);
        state.completion_strategy = CompletionStrategy::Promise;
        state.record_progress(
            TaskStatus::InProgress,
            Some(format!("sent reply {MARKER}")),
            Utc::now(),
        );
        assert!(state.completion(false, MARKER).complete);

        state.record_progress(TaskStatus::Blocked, Some("new problem".to_string()), Utc::now());
        assert!(!state.completion(false, MARKER).complete);
    }

    #[test]
    fn record_progress_appends_history_and_notes() {
        let mut state = sample_state("a", 5);
        state.increment(Utc::now());
        state.record_progress(TaskStatus::Blocked, Some("needs login".to_string()), Utc::now());
        state.record_progress(TaskStatus::InProgress, None, Utc::now());

        assert_eq!(state.notes, vec!["needs login".to_string()]);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].iteration, 2);
        assert_eq!(state.history[0].status, TaskStatus::Blocked);
        assert_eq!(state.status, TaskStatus::InProgress);
    }

    #[test]
    fn task_id_is_stable_per_path() {
        let a = derive_task_id(Path::new("/vault/Needs_Action/EMAIL_Invoice #42.md"));
        let b = derive_task_id(Path::new("/vault/Needs_Action/EMAIL_Invoice #42.md"));
        let c = derive_task_id(Path::new("/vault/Needs_Action/other.md"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("email-invoice-42-"));
        assert_eq!(a.len(), "email-invoice-42-".len() + ID_HASH_CHARS);
    }
}
