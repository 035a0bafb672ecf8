//! Shared deterministic types for the loop core.
//!
//! These define the stable wire labels used in persisted records and RPC
//! payloads. They must not depend on external state or I/O.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RalphError, Result};

/// Stored status of a task's state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Blocked,
    WaitingApproval,
    Complete,
}

/// Rule used to decide that a task is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStrategy {
    /// Complete once the original file appears at `target_path`.
    FileMovement,
    /// Complete once the latest history entry carries the completion marker.
    Promise,
}

/// Task priority as declared in the task's metadata header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Lower rank wins a claim.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStrategy {
    Sequential,
    Parallel,
}

/// Result of a single approval lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// The state is not currently `waiting_approval`.
    NotWaiting,
    Approved,
    Rejected,
    Pending,
    /// Waiting, but the file is in none of the approval folders.
    NotFound,
}

impl ApprovalStatus {
    pub fn is_decided(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

/// Final outcome of a blocking approval wait. All variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitDecision {
    Approved,
    Rejected,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Window over archived records used for performance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsRange {
    Today,
    Week,
    Month,
    All,
}

/// Parse a wire label (e.g. `"waiting_approval"`) into one of the enums above.
pub fn parse_label<T: DeserializeOwned>(field: &str, value: &str) -> Result<T> {
    serde_json::from_value(Value::String(value.to_string()))
        .map_err(|_| RalphError::invalid(format!("{field}: unsupported value '{value}'")))
}

/// Render an enum back to its wire label.
pub fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}
