//! Core configuration stored under `.ralph/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::estimator::EstimatorTable;
use crate::core::health::HealthThresholds;
use crate::core::types::CompletionStrategy;

/// Ralph configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to the values
/// the watchers and approval processor use by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RalphConfig {
    /// Tracing directive used when `RUST_LOG` is unset (e.g. `"info"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub dirs: DirsConfig,
    #[serde(rename = "loop")]
    pub looping: LoopConfig,
    pub approval: ApprovalConfig,
    pub health: HealthThresholds,
    pub estimator: EstimatorTable,
}

/// Directory names, resolved relative to the vault root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DirsConfig {
    pub inbox: String,
    pub done: String,
    pub pending_approval: String,
    pub approved: String,
    pub rejected: String,
    pub state: String,
    pub archive: String,
    pub groups: String,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            inbox: "Needs_Action".to_string(),
            done: "Done".to_string(),
            pending_approval: "Pending_Approval".to_string(),
            approved: "Approved".to_string(),
            rejected: "Rejected".to_string(),
            state: ".ralph/state".to_string(),
            archive: ".ralph/archive".to_string(),
            groups: ".ralph/groups".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Used by `create` when the caller does not pass `max_iterations`.
    pub max_iterations_default: u32,
    /// Text that marks completion under the `promise` strategy.
    pub completion_marker: String,
    pub default_strategy: CompletionStrategy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations_default: 10,
            completion_marker: "<promise>TASK_COMPLETE</promise>".to_string(),
            default_strategy: CompletionStrategy::FileMovement,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalConfig {
    pub timeout_minutes: u64,
    pub poll_interval_seconds: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 60,
            poll_interval_seconds: 30,
        }
    }
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            dirs: DirsConfig::default(),
            looping: LoopConfig::default(),
            approval: ApprovalConfig::default(),
            health: HealthThresholds::default(),
            estimator: EstimatorTable::default(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.looping.max_iterations_default == 0 {
            return Err(anyhow!("loop.max_iterations_default must be > 0"));
        }
        if self.looping.completion_marker.trim().is_empty() {
            return Err(anyhow!("loop.completion_marker must not be empty"));
        }
        if self.approval.poll_interval_seconds == 0 {
            return Err(anyhow!("approval.poll_interval_seconds must be > 0"));
        }
        if self.health.critical_stuck == 0 {
            return Err(anyhow!("health.critical_stuck must be > 0"));
        }
        let dirs = [
            ("inbox", &self.dirs.inbox),
            ("done", &self.dirs.done),
            ("pending_approval", &self.dirs.pending_approval),
            ("approved", &self.dirs.approved),
            ("rejected", &self.dirs.rejected),
            ("state", &self.dirs.state),
            ("archive", &self.dirs.archive),
            ("groups", &self.dirs.groups),
        ];
        for (name, value) in dirs {
            if value.trim().is_empty() {
                return Err(anyhow!("dirs.{name} must not be empty"));
            }
        }
        self.estimator.validate().map_err(|msg| anyhow!(msg))?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
