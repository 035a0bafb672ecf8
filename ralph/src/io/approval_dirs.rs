//! Read-only view of the approval folders maintained by the external approval
//! processor, plus a change watcher used to wake blocked approval waits.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::types::ApprovalStatus;
use crate::io::init::VaultPaths;

/// A task file found in one of the approval folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalHit {
    pub folder: ApprovalStatus,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ApprovalDirs {
    pub approved: PathBuf,
    pub rejected: PathBuf,
    pub pending: PathBuf,
}

impl ApprovalDirs {
    pub fn new(paths: &VaultPaths) -> Self {
        Self {
            approved: paths.approved_dir.clone(),
            rejected: paths.rejected_dir.clone(),
            pending: paths.pending_approval_dir.clone(),
        }
    }

    /// Search folders in decision order (approved, rejected, pending) for a
    /// file named `filename`. Returns every folder that holds a match.
    pub fn locate(&self, filename: &str) -> Vec<ApprovalHit> {
        [
            (ApprovalStatus::Approved, &self.approved),
            (ApprovalStatus::Rejected, &self.rejected),
            (ApprovalStatus::Pending, &self.pending),
        ]
        .into_iter()
        .filter_map(|(folder, dir)| {
            find_file(dir, filename).map(|(path, modified)| ApprovalHit {
                folder,
                path,
                modified,
            })
        })
        .collect()
    }

    /// Watch the decision folders for changes.
    ///
    /// Fails when none of them exists or the watcher cannot be registered;
    /// callers fall back to interval polling.
    pub fn watch(&self, poll_interval: Duration) -> notify::Result<ApprovalWatch> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = PollWatcher::new(
            tx,
            notify::Config::default().with_poll_interval(poll_interval),
        )?;
        let mut watched = 0;
        for dir in [&self.approved, &self.rejected] {
            if dir.is_dir() {
                watcher.watch(dir, RecursiveMode::Recursive)?;
                info!(path = %dir.display(), "watching approval folder");
                watched += 1;
            }
        }
        if watched == 0 {
            return Err(notify::Error::generic("no approval folder to watch"));
        }
        Ok(ApprovalWatch {
            _watcher: watcher,
            events: rx,
        })
    }
}

/// Why a wait on an [`ApprovalWatch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A file was created, moved or modified in a decision folder.
    Changed,
    /// Nothing happened before the timeout.
    Idle,
    /// The watcher stopped delivering events.
    Disconnected,
}

pub struct ApprovalWatch {
    _watcher: PollWatcher,
    events: Receiver<notify::Result<Event>>,
}

impl ApprovalWatch {
    pub fn wait(&self, timeout: Duration) -> Wake {
        match self.events.recv_timeout(timeout) {
            Ok(Ok(event)) if is_relevant(&event.kind) => {
                debug!(paths = ?event.paths, "approval folder changed");
                self.drain();
                Wake::Changed
            }
            Ok(_) => Wake::Idle,
            Err(RecvTimeoutError::Timeout) => Wake::Idle,
            Err(RecvTimeoutError::Disconnected) => Wake::Disconnected,
        }
    }

    fn drain(&self) {
        while self.events.try_recv().is_ok() {}
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    )
}

fn find_file(dir: &Path, filename: &str) -> Option<(PathBuf, DateTime<Utc>)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| entry.file_name().to_str() == Some(filename))
        .and_then(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.into_path(), DateTime::<Utc>::from(modified)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dirs(root: &Path) -> ApprovalDirs {
        ApprovalDirs::new(&VaultPaths::new(root))
    }

    #[test]
    fn locate_searches_nested_folders() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dirs = dirs(temp.path());
        let nested = dirs.approved.join("2026-01");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("EMAIL_1.md"), "x").expect("write");

        let hits = dirs.locate("EMAIL_1.md");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].folder, ApprovalStatus::Approved);
        assert!(hits[0].path.ends_with("2026-01/EMAIL_1.md"));
        assert!(dirs.locate("EMAIL_2.md").is_empty());
    }

    #[test]
    fn locate_reports_every_folder_in_decision_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dirs = dirs(temp.path());
        for dir in [&dirs.pending, &dirs.rejected] {
            fs::create_dir_all(dir).expect("mkdir");
            fs::write(dir.join("T.md"), "x").expect("write");
        }
        let folders: Vec<ApprovalStatus> =
            dirs.locate("T.md").into_iter().map(|h| h.folder).collect();
        assert_eq!(
            folders,
            vec![ApprovalStatus::Rejected, ApprovalStatus::Pending]
        );
    }

    #[test]
    fn watch_requires_an_existing_folder() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dirs = dirs(temp.path());
        assert!(dirs.watch(Duration::from_millis(20)).is_err());

        fs::create_dir_all(&dirs.approved).expect("mkdir");
        let watch = dirs.watch(Duration::from_millis(20)).expect("watch");
        assert_eq!(watch.wait(Duration::from_millis(10)), Wake::Idle);
    }
}
