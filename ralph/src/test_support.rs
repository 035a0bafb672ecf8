//! Test-only helpers: deterministic state records and throwaway vaults.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::core::state::{NewState, RalphState};
use crate::core::types::CompletionStrategy;
use crate::io::config::RalphConfig;
use crate::io::init::{InitOptions, VaultPaths, init_vault};
use crate::service::Ralph;

/// Fixed timestamp so records compare equal across runs.
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .expect("fixed timestamp")
        .with_timezone(&Utc)
}

/// Fresh `in_progress` record at iteration 1 with a file-movement strategy.
pub fn sample_state(task_id: &str, max_iterations: u32) -> RalphState {
    RalphState::new(
        task_id.to_string(),
        NewState {
            original_path: PathBuf::from(format!("/vault/Needs_Action/{task_id}.md")),
            target_path: PathBuf::from(format!("/vault/Done/{task_id}.md")),
            prompt: format!("{task_id} prompt"),
            max_iterations,
            strategy: CompletionStrategy::FileMovement,
        },
        fixed_time(),
    )
}

/// An initialized vault in a temporary directory, removed on drop.
pub struct TestVault {
    pub temp: TempDir,
    pub paths: VaultPaths,
}

impl TestVault {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("create temp vault");
        let paths = init_vault(temp.path(), &InitOptions::default()).expect("init vault");
        Self { temp, paths }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Core instance over this vault with default config.
    pub fn ralph(&self) -> Ralph {
        Ralph::new(self.root(), RalphConfig::default())
    }

    /// Write `<inbox>/<name>` with the given header lines and body.
    pub fn write_task(&self, name: &str, header: &[&str], body: &str) -> PathBuf {
        let path = self.paths.inbox_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create task dir");
        }
        let contents = format!("---\n{}\n---\n{body}", header.join("\n"));
        fs::write(&path, contents).expect("write task");
        path
    }

    pub fn set_modified(&self, path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(time))
            .expect("set mtime");
    }
}

impl Default for TestVault {
    fn default() -> Self {
        Self::new()
    }
}
