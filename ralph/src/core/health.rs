//! Health classification and historical metrics over state records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::state::RalphState;
use crate::core::types::{HealthStatus, MetricsRange, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Stuck-task count at which health becomes `critical`.
    pub critical_stuck: usize,
    /// Active-task count above which health is at least `warning`.
    pub warning_active: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_stuck: 3,
            warning_active: 20,
        }
    }
}

pub fn classify(stuck: usize, active: usize, thresholds: &HealthThresholds) -> HealthStatus {
    if stuck >= thresholds.critical_stuck {
        HealthStatus::Critical
    } else if stuck > 0 || active > thresholds.warning_active {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Human-readable explanation of why a record is stuck, if it is.
pub fn stuck_reason(state: &RalphState) -> Option<String> {
    let mut reasons = Vec::new();
    if state.budget_exhausted() {
        reasons.push(format!(
            "iteration budget exhausted ({}/{})",
            state.current_iteration, state.max_iterations
        ));
    }
    if state.status == TaskStatus::Blocked {
        reasons.push("status is blocked".to_string());
    }
    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join("; "))
    }
}

/// An archived record paired with the modification time of its archive file.
#[derive(Debug, Clone)]
pub struct ArchivedRecord {
    pub state: RalphState,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub range: MetricsRange,
    pub total_archived: usize,
    pub completed: usize,
    pub blocked: usize,
    pub avg_iterations: f64,
    pub avg_minutes: f64,
    pub success_rate: f64,
    pub blocked_rate: f64,
}

impl PerformanceMetrics {
    fn empty(range: MetricsRange) -> Self {
        Self {
            range,
            total_archived: 0,
            completed: 0,
            blocked: 0,
            avg_iterations: 0.0,
            avg_minutes: 0.0,
            success_rate: 0.0,
            blocked_rate: 0.0,
        }
    }
}

/// Earliest archive time included in `range`; `None` means unbounded.
pub fn range_start(range: MetricsRange, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match range {
        MetricsRange::Today => now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc()),
        MetricsRange::Week => Some(now - Duration::days(7)),
        MetricsRange::Month => Some(now - Duration::days(30)),
        MetricsRange::All => None,
    }
}

pub fn aggregate(
    records: &[ArchivedRecord],
    range: MetricsRange,
    now: DateTime<Utc>,
) -> PerformanceMetrics {
    let start = range_start(range, now);
    let in_range: Vec<&ArchivedRecord> = records
        .iter()
        .filter(|r| start.is_none_or(|s| r.archived_at >= s))
        .collect();
    if in_range.is_empty() {
        return PerformanceMetrics::empty(range);
    }

    let total = in_range.len();
    let count = total as f64;
    let iterations: f64 = in_range
        .iter()
        .map(|r| f64::from(r.state.current_iteration))
        .sum();
    let minutes: f64 = in_range
        .iter()
        .map(|r| (r.archived_at - r.state.started_at).num_seconds().max(0) as f64 / 60.0)
        .sum();
    let completed = in_range
        .iter()
        .filter(|r| r.state.status == TaskStatus::Complete)
        .count();
    let blocked = in_range
        .iter()
        .filter(|r| r.state.status == TaskStatus::Blocked)
        .count();

    PerformanceMetrics {
        range,
        total_archived: total,
        completed,
        blocked,
        avg_iterations: round2(iterations / count),
        avg_minutes: round2(minutes / count),
        success_rate: round2(completed as f64 / count),
        blocked_rate: round2(blocked as f64 / count),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
