//! TaskRepository: read-only access to the task inbox.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::selector::{ClaimFilter, PendingTask, select_next};
use crate::error::{RalphError, Result, io_at};
use crate::io::task_doc::{TaskDocument, read_task};

const TASK_EXT: &str = "md";

/// Inbox file that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTask {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingListing {
    pub tasks: Vec<PendingTask>,
    pub skipped: Vec<SkippedTask>,
}

/// Parsed metadata and body of one task file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetails {
    pub path: PathBuf,
    pub metadata: Map<String, Value>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TaskRepository {
    inbox_dir: PathBuf,
}

impl TaskRepository {
    pub fn new(inbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            inbox_dir: inbox_dir.into(),
        }
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inbox_dir
    }

    /// Recursively scan the inbox. Unparseable documents land in `skipped`.
    pub fn list_pending(&self) -> Result<PendingListing> {
        let mut listing = PendingListing::default();
        if !self.inbox_dir.is_dir() {
            debug!(inbox = %self.inbox_dir.display(), "inbox missing; nothing pending");
            return Ok(listing);
        }
        for entry in WalkDir::new(&self.inbox_dir).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(self.inbox_dir.as_path()).to_path_buf();
                match err.into_io_error() {
                    Some(source) => RalphError::Io { path, source },
                    None => RalphError::invalid(format!("walk {}", path.display())),
                }
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(TASK_EXT)
            {
                continue;
            }
            match pending_task(path) {
                Ok(task) => listing.tasks.push(task),
                Err(err @ RalphError::MalformedTask { .. }) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed task");
                    listing.skipped.push(SkippedTask {
                        path: path.to_path_buf(),
                        error: err.to_string(),
                    });
                }
                // Removed between the walk and the read.
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        debug!(
            pending = listing.tasks.len(),
            skipped = listing.skipped.len(),
            "inbox scanned"
        );
        Ok(listing)
    }

    /// Pick the next claimable task, or `None` when nothing matches.
    ///
    /// `is_claimed` reports tasks that already have an active state record.
    pub fn claim_next<F>(&self, filter: &ClaimFilter, is_claimed: F) -> Result<Option<PendingTask>>
    where
        F: Fn(&PendingTask) -> bool,
    {
        let listing = self.list_pending()?;
        let picked = select_next(&listing.tasks, filter, is_claimed).cloned();
        match &picked {
            Some(task) => debug!(path = %task.path.display(), priority = ?task.priority, "claimed task"),
            None => debug!(?filter, "no claimable task"),
        }
        Ok(picked)
    }

    /// Metadata and body of a task file. Relative paths that do not exist as
    /// given are resolved against the inbox.
    pub fn get_details(&self, path: &Path) -> Result<TaskDetails> {
        let resolved = self.resolve(path);
        let doc = read_task(&resolved)?;
        Ok(TaskDetails {
            path: resolved,
            metadata: doc.metadata,
            body: doc.body,
        })
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() && !path.exists() {
            let candidate = self.inbox_dir.join(path);
            if candidate.exists() {
                return candidate;
            }
        }
        path.to_path_buf()
    }
}

fn pending_task(path: &Path) -> Result<PendingTask> {
    let doc = read_task(path)?;
    let meta = path.metadata().map_err(io_at(path))?;
    let modified = meta.modified().map_err(io_at(path))?;
    Ok(to_pending(path, &doc, meta.len(), DateTime::<Utc>::from(modified)))
}

fn to_pending(path: &Path, doc: &TaskDocument, size: u64, modified: DateTime<Utc>) -> PendingTask {
    PendingTask {
        path: path.to_path_buf(),
        filename: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        task_type: doc.task_type().to_string(),
        priority: doc.priority(),
        status: doc.status().to_string(),
        created: doc.created().map(str::to_string),
        size,
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Priority;
    use crate::test_support::TestVault;
    use std::time::{Duration, SystemTime};

    #[test]
    fn lists_nested_markdown_and_reports_malformed() {
        let vault = TestVault::new();
        vault.write_task("EMAIL_1.md", &["type: email", "priority: high"], "hi");
        vault.write_task("sub/INVOICE_2.md", &["type: invoice"], "pay");
        std::fs::write(vault.paths.inbox_dir.join("notes.txt"), "ignored").expect("write");
        std::fs::write(vault.paths.inbox_dir.join("broken.md"), "no header").expect("write");

        let repo = TaskRepository::new(&vault.paths.inbox_dir);
        let listing = repo.list_pending().expect("list");
        let names: Vec<&str> = listing.tasks.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["EMAIL_1.md", "INVOICE_2.md"]);
        assert_eq!(listing.tasks[1].priority, Priority::Medium);
        assert_eq!(listing.tasks[1].status, "pending");
        assert_eq!(listing.skipped.len(), 1);
        assert!(listing.skipped[0].path.ends_with("broken.md"));
    }

    #[test]
    fn non_utf8_task_is_skipped_not_fatal() {
        let vault = TestVault::new();
        vault.write_task("GOOD.md", &["type: email", "priority: high"], "ok");
        let bad = vault.paths.inbox_dir.join("BAD.md");
        std::fs::write(&bad, b"---\ntype: email\n---\n\xff\xfe").expect("write");

        let repo = TaskRepository::new(&vault.paths.inbox_dir);
        let listing = repo.list_pending().expect("list");
        assert_eq!(listing.tasks.len(), 1);
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(listing.skipped[0].path, bad);
        assert!(listing.skipped[0].error.contains("UTF-8"));

        let claimed = repo
            .claim_next(&ClaimFilter::default(), |_| false)
            .expect("claim")
            .expect("task");
        assert_eq!(claimed.filename, "GOOD.md");
    }

    #[test]
    fn claim_prefers_priority_then_age_and_skips_claimed() {
        let vault = TestVault::new();
        let old = vault.write_task("old.md", &["type: email", "priority: low"], "");
        let high = vault.write_task("high.md", &["type: email", "priority: high"], "");
        let base = SystemTime::now() - Duration::from_secs(3600);
        vault.set_modified(&old, base);
        vault.set_modified(&high, base + Duration::from_secs(60));

        let repo = TaskRepository::new(&vault.paths.inbox_dir);
        let first = repo
            .claim_next(&ClaimFilter::default(), |_| false)
            .expect("claim")
            .expect("task");
        assert_eq!(first.filename, "high.md");

        let second = repo
            .claim_next(&ClaimFilter::default(), |t| t.filename == "high.md")
            .expect("claim")
            .expect("task");
        assert_eq!(second.filename, "old.md");

        let none = repo
            .claim_next(&ClaimFilter::default(), |_| true)
            .expect("claim");
        assert!(none.is_none());
    }

    #[test]
    fn details_resolve_relative_to_inbox() {
        let vault = TestVault::new();
        vault.write_task("T1.md", &["type: email", "subject: Re: hello"], "body text\n");
        let repo = TaskRepository::new(&vault.paths.inbox_dir);

        let details = repo.get_details(Path::new("T1.md")).expect("details");
        assert_eq!(details.metadata["subject"], "Re: hello");
        assert_eq!(details.body, "body text\n");

        let err = repo.get_details(Path::new("missing.md")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn missing_inbox_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = TaskRepository::new(temp.path().join("nope"));
        assert_eq!(repo.list_pending().expect("list"), PendingListing::default());
    }
}
