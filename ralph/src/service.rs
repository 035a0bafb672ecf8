//! The per-process core instance.
//!
//! [`Ralph`] is built once from a vault root and a config and then handed to
//! the dispatcher. There is no global instance.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;

use crate::approval::{ApprovalBridge, WaitOptions};
use crate::core::selector::{ClaimFilter, PendingTask};
use crate::core::state::{RalphState, derive_task_id};
use crate::error::{RalphError, Result};
use crate::estimate::EffortEstimator;
use crate::groups::GroupManager;
use crate::health::HealthMonitor;
use crate::io::approval_dirs::ApprovalDirs;
use crate::io::config::{RalphConfig, load_config};
use crate::io::group_store::GroupStore;
use crate::io::inbox::TaskRepository;
use crate::io::init::VaultPaths;
use crate::io::state_store::StateStore;
use crate::states::{CreateRequest, StateManager};

#[derive(Debug, Clone)]
pub struct Ralph {
    pub paths: VaultPaths,
    pub config: RalphConfig,
    pub tasks: TaskRepository,
    pub states: StateManager,
    pub groups: GroupManager,
    pub approval: ApprovalBridge,
    pub estimator: EffortEstimator,
    pub health: HealthMonitor,
}

impl Ralph {
    pub fn new(root: impl Into<std::path::PathBuf>, config: RalphConfig) -> Self {
        let paths = VaultPaths::with_dirs(root, &config.dirs);
        let store = StateStore::new(&paths.state_dir, &paths.archive_dir);
        let tasks = TaskRepository::new(&paths.inbox_dir);
        Self {
            states: StateManager::new(store.clone(), &paths.done_dir, config.looping.clone()),
            groups: GroupManager::new(GroupStore::new(&paths.groups_dir), store.clone()),
            approval: ApprovalBridge::new(store.clone(), ApprovalDirs::new(&paths)),
            estimator: EffortEstimator::new(config.estimator.clone(), tasks.clone()),
            health: HealthMonitor::new(store, config.health.clone()),
            tasks,
            paths,
            config,
        }
    }

    /// Load `<root>/.ralph/config.toml` (or `config_path`) and build the core.
    pub fn open(root: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let default_path = VaultPaths::new(root).config_path;
        let path = config_path.unwrap_or(&default_path);
        let config = load_config(path).with_context(|| format!("load config {}", path.display()))?;
        info!(root = %root.display(), config = %path.display(), "core opened");
        Ok(Self::new(root, config))
    }

    /// Claim the best pending task that has no active state record yet.
    pub fn claim_next(&self, filter: &ClaimFilter) -> Result<Option<PendingTask>> {
        let store = self.states.store();
        self.tasks.claim_next(filter, |task| {
            std::path::absolute(&task.path)
                .map(|abs| store.is_active(&derive_task_id(&abs)))
                .unwrap_or(false)
        })
    }

    /// Create a state record. Relative paths may be given relative to the inbox.
    pub fn create_state(&self, mut request: CreateRequest) -> Result<RalphState> {
        request.path = self.tasks.resolve(&request.path);
        self.states.create(request)
    }

    /// Wait options from optional call arguments, falling back to config.
    pub fn wait_options(
        &self,
        timeout_minutes: Option<f64>,
        poll_interval_seconds: Option<f64>,
    ) -> Result<WaitOptions> {
        let timeout_minutes =
            timeout_minutes.unwrap_or(self.config.approval.timeout_minutes as f64);
        let poll_seconds =
            poll_interval_seconds.unwrap_or(self.config.approval.poll_interval_seconds as f64);
        let now = Instant::now();
        let in_range = |d: &Duration| now.checked_add(*d).is_some();
        let timeout = Duration::try_from_secs_f64(timeout_minutes * 60.0)
            .ok()
            .filter(in_range)
            .ok_or_else(|| {
                RalphError::invalid("timeout_minutes must be a non-negative number in range")
            })?;
        let poll_interval = Duration::try_from_secs_f64(poll_seconds)
            .ok()
            .filter(|d| !d.is_zero() && in_range(d))
            .ok_or_else(|| RalphError::invalid("poll_interval_seconds must be positive and in range"))?;
        Ok(WaitOptions {
            timeout,
            poll_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestVault;

    #[test]
    fn claim_skips_tasks_that_already_have_state() {
        let vault = TestVault::new();
        vault.write_task("A.md", &["type: email", "priority: high"], "");
        vault.write_task("B.md", &["type: email", "priority: low"], "");
        let ralph = vault.ralph();

        let first = ralph
            .claim_next(&ClaimFilter::default())
            .expect("claim")
            .expect("task");
        assert_eq!(first.filename, "A.md");
        ralph
            .create_state(CreateRequest {
                path: first.path,
                prompt: "go".to_string(),
                max_iterations: None,
                strategy: None,
            })
            .expect("create");

        let second = ralph
            .claim_next(&ClaimFilter::default())
            .expect("claim")
            .expect("task");
        assert_eq!(second.filename, "B.md");
    }

    #[test]
    fn create_resolves_inbox_relative_paths() {
        let vault = TestVault::new();
        let task = vault.write_task("R.md", &["type: email"], "");
        let ralph = vault.ralph();
        let state = ralph
            .create_state(CreateRequest {
                path: "R.md".into(),
                prompt: String::new(),
                max_iterations: Some(2),
                strategy: None,
            })
            .expect("create");
        assert_eq!(state.original_path, std::path::absolute(task).expect("absolute"));
    }

    #[test]
    fn wait_options_validate_numbers() {
        let vault = TestVault::new();
        let ralph = vault.ralph();
        let defaults = ralph.wait_options(None, None).expect("defaults");
        assert_eq!(defaults.timeout, Duration::from_secs(3600));
        assert_eq!(defaults.poll_interval, Duration::from_secs(30));
        assert!(ralph.wait_options(Some(-1.0), None).is_err());
        assert!(ralph.wait_options(None, Some(0.0)).is_err());
        assert!(ralph.wait_options(Some(2e17), None).is_err());
        assert!(ralph.wait_options(None, Some(1e19)).is_err());
        assert!(ralph.wait_options(Some(f64::NAN), None).is_err());
    }

    #[test]
    fn open_reads_config_from_vault() {
        let vault = TestVault::new();
        let ralph = Ralph::open(vault.root(), None).expect("open");
        assert_eq!(ralph.config, RalphConfig::default());
        assert!(ralph.paths.inbox_dir.ends_with("Needs_Action"));
    }
}
