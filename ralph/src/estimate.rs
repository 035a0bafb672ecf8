//! EffortEstimator: sizes a task file using the configured table.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::core::estimator::{Estimate, EstimatorTable, estimate};
use crate::error::Result;
use crate::io::inbox::TaskRepository;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEstimate {
    pub path: PathBuf,
    #[serde(flatten)]
    pub estimate: Estimate,
}

#[derive(Debug, Clone)]
pub struct EffortEstimator {
    table: EstimatorTable,
    tasks: TaskRepository,
}

impl EffortEstimator {
    pub fn new(table: EstimatorTable, tasks: TaskRepository) -> Self {
        Self { table, tasks }
    }

    pub fn estimate(&self, path: &Path) -> Result<TaskEstimate> {
        let details = self.tasks.get_details(path)?;
        let task_type = details
            .metadata
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let estimate = estimate(&self.table, task_type, details.body.chars().count());
        debug!(
            path = %details.path.display(),
            steps = estimate.estimated_steps,
            complexity = ?estimate.complexity,
            "effort estimated"
        );
        Ok(TaskEstimate {
            path: details.path,
            estimate,
        })
    }
}
