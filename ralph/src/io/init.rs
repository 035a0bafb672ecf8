//! Canonical vault layout and `ralph init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{DirsConfig, RalphConfig, write_config};

/// All canonical paths for a vault root.
#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub root: PathBuf,
    pub ralph_dir: PathBuf,
    pub config_path: PathBuf,
    /// Watchers write here; the core only reads.
    pub inbox_dir: PathBuf,
    /// An external executor moves finished task files here.
    pub done_dir: PathBuf,
    pub pending_approval_dir: PathBuf,
    pub approved_dir: PathBuf,
    pub rejected_dir: PathBuf,
    pub state_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub groups_dir: PathBuf,
}

impl VaultPaths {
    /// Layout with default directory names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_dirs(root, &DirsConfig::default())
    }

    pub fn with_dirs(root: impl Into<PathBuf>, dirs: &DirsConfig) -> Self {
        let root = root.into();
        let ralph_dir = root.join(".ralph");
        Self {
            config_path: ralph_dir.join("config.toml"),
            ralph_dir,
            inbox_dir: root.join(&dirs.inbox),
            done_dir: root.join(&dirs.done),
            pending_approval_dir: root.join(&dirs.pending_approval),
            approved_dir: root.join(&dirs.approved),
            rejected_dir: root.join(&dirs.rejected),
            state_dir: root.join(&dirs.state),
            archive_dir: root.join(&dirs.archive),
            groups_dir: root.join(&dirs.groups),
            root,
        }
    }

    /// Every directory the core reads or writes.
    pub fn all_dirs(&self) -> [&Path; 8] {
        [
            &self.inbox_dir,
            &self.done_dir,
            &self.pending_approval_dir,
            &self.approved_dir,
            &self.rejected_dir,
            &self.state_dir,
            &self.archive_dir,
            &self.groups_dir,
        ]
    }
}

/// Options for `init_vault`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite an existing `.ralph/config.toml`.
    pub force: bool,
    /// Written to `.ralph/config.toml`; its `[dirs]` decide which folders are created.
    pub config: RalphConfig,
}

/// Create the vault directory layout and config in `root`.
///
/// Fails if `.ralph/config.toml` already exists unless `options.force` is set.
/// Existing task, approval and state files are never touched.
pub fn init_vault(root: &Path, options: &InitOptions) -> Result<VaultPaths> {
    let paths = VaultPaths::with_dirs(root, &options.config.dirs);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "ralph init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    if paths.ralph_dir.exists() && !paths.ralph_dir.is_dir() {
        return Err(anyhow!("ralph init: .ralph exists but is not a directory"));
    }

    create_dir(&paths.ralph_dir)?;
    for dir in paths.all_dirs() {
        create_dir(dir)?;
    }
    write_config(&paths.config_path, &options.config)?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
