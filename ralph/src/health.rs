//! HealthMonitor: classification of active records and metrics over archived ones.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::health::{HealthThresholds, PerformanceMetrics, aggregate, classify, stuck_reason};
use crate::core::types::{HealthStatus, MetricsRange, TaskStatus};
use crate::error::Result;
use crate::io::state_store::StateStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub active_count: usize,
    pub stuck_count: usize,
    pub in_progress_count: usize,
    pub blocked_count: usize,
    pub waiting_approval_count: usize,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StuckTask {
    pub task_id: String,
    pub original_path: PathBuf,
    pub status: TaskStatus,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    states: StateStore,
    thresholds: HealthThresholds,
}

impl HealthMonitor {
    pub fn new(states: StateStore, thresholds: HealthThresholds) -> Self {
        Self { states, thresholds }
    }

    pub fn get_health(&self) -> Result<HealthReport> {
        let active = self.states.list_active()?;
        let count = |status: TaskStatus| active.iter().filter(|s| s.status == status).count();
        let stuck_count = active.iter().filter(|s| s.is_stuck()).count();
        let report = HealthReport {
            status: classify(stuck_count, active.len(), &self.thresholds),
            active_count: active.len(),
            stuck_count,
            in_progress_count: count(TaskStatus::InProgress),
            blocked_count: count(TaskStatus::Blocked),
            waiting_approval_count: count(TaskStatus::WaitingApproval),
            checked_at: Utc::now(),
        };
        debug!(status = ?report.status, active = report.active_count, stuck = stuck_count, "health computed");
        Ok(report)
    }

    pub fn get_stuck_tasks(&self) -> Result<Vec<StuckTask>> {
        Ok(self
            .states
            .list_active()?
            .into_iter()
            .filter_map(|state| {
                let reason = stuck_reason(&state)?;
                Some(StuckTask {
                    task_id: state.task_id,
                    original_path: state.original_path,
                    status: state.status,
                    current_iteration: state.current_iteration,
                    max_iterations: state.max_iterations,
                    reason,
                })
            })
            .collect())
    }

    pub fn get_performance_metrics(&self, range: MetricsRange) -> Result<PerformanceMetrics> {
        let records = self.states.list_archived()?;
        Ok(aggregate(&records, range, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestVault, sample_state};

    fn monitor(vault: &TestVault) -> (HealthMonitor, StateStore) {
        let states = StateStore::new(&vault.paths.state_dir, &vault.paths.archive_dir);
        (HealthMonitor::new(states.clone(), HealthThresholds::default()), states)
    }

    fn insert_stuck(states: &StateStore, id: &str) {
        let mut state = sample_state(id, 3);
        state.current_iteration = 3;
        states.insert(&state).expect("insert");
    }

    #[test]
    fn empty_store_is_healthy() {
        let vault = TestVault::new();
        let (monitor, _) = monitor(&vault);
        let report = monitor.get_health().expect("health");
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.active_count, 0);
    }

    #[test]
    fn one_stuck_task_warns_and_three_are_critical() {
        let vault = TestVault::new();
        let (monitor, states) = monitor(&vault);
        states.insert(&sample_state("ok", 5)).expect("insert");
        insert_stuck(&states, "s1");
        assert_eq!(monitor.get_health().expect("health").status, HealthStatus::Warning);

        let mut blocked = sample_state("s2", 5);
        blocked.status = TaskStatus::Blocked;
        states.insert(&blocked).expect("insert");
        insert_stuck(&states, "s3");

        let report = monitor.get_health().expect("health");
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.stuck_count, 3);
        assert_eq!(report.blocked_count, 1);
        assert_eq!(report.active_count, 4);
    }

    #[test]
    fn stuck_tasks_carry_reasons() {
        let vault = TestVault::new();
        let (monitor, states) = monitor(&vault);
        insert_stuck(&states, "budget");
        states.insert(&sample_state("fine", 5)).expect("insert");

        let stuck = monitor.get_stuck_tasks().expect("stuck");
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].task_id, "budget");
        assert!(stuck[0].reason.contains("3/3"));

        states.move_to_archive("budget").expect("archive");
        assert!(monitor.get_stuck_tasks().expect("stuck").is_empty());
    }

    #[test]
    fn metrics_cover_archived_records() {
        let vault = TestVault::new();
        let (monitor, states) = monitor(&vault);
        let empty = monitor.get_performance_metrics(MetricsRange::All).expect("metrics");
        assert_eq!(empty.total_archived, 0);
        assert_eq!(empty.success_rate, 0.0);

        let mut done = sample_state("done", 5);
        done.status = TaskStatus::Complete;
        done.current_iteration = 2;
        states.insert(&done).expect("insert");
        states.move_to_archive("done").expect("archive");
        let mut blocked = sample_state("blocked", 5);
        blocked.status = TaskStatus::Blocked;
        blocked.current_iteration = 4;
        states.insert(&blocked).expect("insert");
        states.move_to_archive("blocked").expect("archive");

        let metrics = monitor.get_performance_metrics(MetricsRange::Today).expect("metrics");
        assert_eq!(metrics.total_archived, 2);
        assert_eq!(metrics.avg_iterations, 3.0);
        assert_eq!(metrics.success_rate, 0.5);
        assert_eq!(metrics.blocked_rate, 0.5);
    }
}
