//! Deterministic selection of the next inbox task to claim.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::Priority;

/// Metadata status that marks a task as claimable.
pub const PENDING_STATUS: &str = "pending";

/// One inbox entry as seen by the selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTask {
    pub path: PathBuf,
    pub filename: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: Priority,
    pub status: String,
    pub created: Option<String>,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Optional claim criteria; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub priority: Option<Priority>,
    pub task_type: Option<String>,
}

impl ClaimFilter {
    pub fn matches(&self, task: &PendingTask) -> bool {
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if let Some(wanted) = &self.task_type
            && !wanted.eq_ignore_ascii_case(&task.task_type)
        {
            return false;
        }
        true
    }
}

/// Pick the best claimable task: highest priority, then oldest file, then path.
///
/// `already_claimed` lets the caller exclude tasks that have an active state.
pub fn select_next<'a, F>(
    tasks: &'a [PendingTask],
    filter: &ClaimFilter,
    already_claimed: F,
) -> Option<&'a PendingTask>
where
    F: Fn(&PendingTask) -> bool,
{
    tasks
        .iter()
        .filter(|task| task.status.eq_ignore_ascii_case(PENDING_STATUS))
        .filter(|task| filter.matches(task))
        .filter(|task| !already_claimed(task))
        .min_by(|a, b| {
            (a.priority.rank(), a.modified, &a.path).cmp(&(b.priority.rank(), b.modified, &b.path))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(name: &str, priority: Priority, age_minutes: i64) -> PendingTask {
        let base = DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        PendingTask {
            path: PathBuf::from(format!("/inbox/{name}")),
            filename: name.to_string(),
            task_type: "email".to_string(),
            priority,
            status: PENDING_STATUS.to_string(),
            created: None,
            size: 10,
            modified: base - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn high_priority_wins_over_order_of_discovery() {
        let tasks = vec![
            task("low.md", Priority::Low, 30),
            task("high.md", Priority::High, 0),
            task("medium.md", Priority::Medium, 60),
        ];
        let picked = select_next(&tasks, &ClaimFilter::default(), |_| false).expect("pick");
        assert_eq!(picked.filename, "high.md");
    }

    #[test]
    fn ties_go_to_oldest_file() {
        let tasks = vec![
            task("newer.md", Priority::High, 5),
            task("older.md", Priority::High, 50),
        ];
        let picked = select_next(&tasks, &ClaimFilter::default(), |_| false).expect("pick");
        assert_eq!(picked.filename, "older.md");
    }

    #[test]
    fn filter_and_claimed_tasks_are_excluded() {
        let mut social = task("post.md", Priority::High, 10);
        social.task_type = "linkedin_post".to_string();
        let mut done = task("done.md", Priority::High, 90);
        done.status = "done".to_string();
        let tasks = vec![social, done, task("mail.md", Priority::Low, 1)];

        let filter = ClaimFilter {
            priority: None,
            task_type: Some("EMAIL".to_string()),
        };
        let picked = select_next(&tasks, &filter, |_| false).expect("pick");
        assert_eq!(picked.filename, "mail.md");

        let none = select_next(&tasks, &filter, |t| t.filename == "mail.md");
        assert!(none.is_none());
    }

    #[test]
    fn priority_filter_restricts_candidates() {
        let tasks = vec![
            task("a.md", Priority::High, 1),
            task("b.md", Priority::Medium, 100),
        ];
        let filter = ClaimFilter {
            priority: Some(Priority::Medium),
            task_type: None,
        };
        let picked = select_next(&tasks, &filter, |_| false).expect("pick");
        assert_eq!(picked.filename, "b.md");
    }
}
