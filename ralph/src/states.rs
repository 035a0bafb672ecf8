//! StateStore component: lifecycle of per-task state records.
//!
//! Every mutation is load, apply a pure transition from [`crate::core::state`],
//! then a versioned save. A caller holding a stale copy gets `Conflict`
//! instead of silently overwriting a newer record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::state::{Completion, Continuation, NewState, RalphState, derive_task_id};
use crate::core::types::{CompletionStrategy, TaskStatus, label};
use crate::error::{RalphError, Result, io_at};
use crate::io::config::LoopConfig;
use crate::io::state_store::StateStore;

/// Arguments for [`StateManager::create`]. `None` fields take config defaults.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub path: PathBuf,
    pub prompt: String,
    pub max_iterations: Option<u32>,
    pub strategy: Option<CompletionStrategy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionCheck {
    pub task_id: String,
    #[serde(flatten)]
    pub completion: Completion,
    pub target_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContinueCheck {
    pub task_id: String,
    #[serde(flatten)]
    pub continuation: Continuation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveOutcome {
    pub task_id: String,
    pub archive_path: PathBuf,
    pub status: TaskStatus,
    pub current_iteration: u32,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StateManager {
    store: StateStore,
    done_dir: PathBuf,
    looping: LoopConfig,
}

impl StateManager {
    pub fn new(store: StateStore, done_dir: impl Into<PathBuf>, looping: LoopConfig) -> Self {
        Self {
            store,
            done_dir: done_dir.into(),
            looping,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Start tracking a claimed task. Fails with `AlreadyExists` while a
    /// record for the same file is still active.
    pub fn create(&self, request: CreateRequest) -> Result<RalphState> {
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.looping.max_iterations_default);
        if max_iterations == 0 {
            return Err(RalphError::invalid("max_iterations must be at least 1"));
        }
        let original_path = std::path::absolute(&request.path).map_err(io_at(&request.path))?;
        let filename = original_path
            .file_name()
            .ok_or_else(|| RalphError::invalid("path must name a task file"))?;
        let target_path = self.done_dir.join(filename);

        let task_id = derive_task_id(&original_path);
        let state = RalphState::new(
            task_id,
            NewState {
                original_path,
                target_path,
                prompt: request.prompt,
                max_iterations,
                strategy: request.strategy.unwrap_or(self.looping.default_strategy),
            },
            Utc::now(),
        );
        self.store.insert(&state)?;
        info!(
            task_id = %state.task_id,
            path = %state.original_path.display(),
            max_iterations,
            strategy = ?state.completion_strategy,
            "state created"
        );
        Ok(state)
    }

    pub fn get_state(&self, task_id: &str) -> Result<RalphState> {
        self.store.load(task_id)
    }

    pub fn list_active(&self) -> Result<Vec<RalphState>> {
        self.store.list_active()
    }

    pub fn update_progress(
        &self,
        task_id: &str,
        status: TaskStatus,
        notes: Option<String>,
    ) -> Result<RalphState> {
        let mut state = self.store.load(task_id)?;
        let previous = state.status;
        state.record_progress(status, notes, Utc::now());
        self.store.save(&mut state)?;
        info!(task_id, from = ?previous, to = ?status, iteration = state.current_iteration, "progress recorded");
        Ok(state)
    }

    pub fn increment_iteration(&self, task_id: &str) -> Result<RalphState> {
        let mut state = self.store.load(task_id)?;
        let iteration = state.increment(Utc::now());
        self.store.save(&mut state)?;
        debug!(task_id, iteration, max = state.max_iterations, "iteration advanced");
        Ok(state)
    }

    pub fn check_completion(&self, task_id: &str) -> Result<CompletionCheck> {
        let state = self.store.load(task_id)?;
        Ok(self.completion_of(&state))
    }

    pub fn should_continue(&self, task_id: &str) -> Result<ContinueCheck> {
        let state = self.store.load(task_id)?;
        let completion = self.completion_of(&state).completion;
        let continuation = state.continuation(&completion);
        debug!(task_id, reason = ?continuation.reason, "continuation evaluated");
        Ok(ContinueCheck {
            task_id: state.task_id,
            continuation,
        })
    }

    /// Stamp the record and move it to the archive. A record that is complete
    /// at this point is stored with status `complete`.
    pub fn archive(&self, task_id: &str) -> Result<ArchiveOutcome> {
        let mut state = self.store.load(task_id)?;
        let now = Utc::now();
        let check = self.completion_of(&state);
        if check.completion.complete && state.status != TaskStatus::Complete {
            state.record_progress(
                TaskStatus::Complete,
                Some(format!("archived: {}", label(&check.completion.reason))),
                now,
            );
        }
        state.archived_at = Some(now);
        self.store.save(&mut state)?;
        let archive_path = self.store.move_to_archive(task_id)?;
        info!(task_id, status = ?state.status, archive = %archive_path.display(), "state archived");
        Ok(ArchiveOutcome {
            task_id: state.task_id,
            archive_path,
            status: state.status,
            current_iteration: state.current_iteration,
            archived_at: now,
        })
    }

    fn completion_of(&self, state: &RalphState) -> CompletionCheck {
        let completion = state.completion(
            state.target_path.exists(),
            &self.looping.completion_marker,
        );
        CompletionCheck {
            task_id: state.task_id.clone(),
            completion,
            target_path: state.target_path.clone(),
        }
    }
}
