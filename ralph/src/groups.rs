//! GroupManager: named batches of task ids for status reporting.
//!
//! `process_group` only reads member state; it never drives execution.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::types::{GroupStrategy, label};
use crate::error::{RalphError, Result};
use crate::io::group_store::{GROUP_CREATED, GroupStore, TaskGroup, derive_group_id};
use crate::io::state_store::{StateStore, validate_task_id};

pub const MEMBER_ARCHIVED: &str = "archived";
pub const MEMBER_NOT_FOUND: &str = "not_found";

/// Status snapshot of one group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberStatus {
    pub task_id: String,
    /// Stored status label, or `archived` / `not_found` without an active record.
    pub status: String,
    pub current_iteration: Option<u32>,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub group_id: String,
    pub group_name: String,
    pub strategy: GroupStrategy,
    /// Members in group order. For `parallel` groups the order carries no meaning.
    pub members: Vec<MemberStatus>,
    /// Member count per status label.
    pub summary: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct GroupManager {
    groups: GroupStore,
    states: StateStore,
}

impl GroupManager {
    pub fn new(groups: GroupStore, states: StateStore) -> Self {
        Self { groups, states }
    }

    /// Persist a group. Member ids are stored as given, not checked.
    pub fn create_group(
        &self,
        task_ids: Vec<String>,
        name: &str,
        strategy: GroupStrategy,
    ) -> Result<TaskGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RalphError::invalid("group_name must not be empty"));
        }
        if task_ids.is_empty() {
            return Err(RalphError::invalid("task_ids must not be empty"));
        }
        let now = Utc::now();
        let group = TaskGroup {
            group_id: derive_group_id(name, &task_ids, now),
            group_name: name.to_string(),
            task_ids,
            strategy,
            created_at: now,
            status: GROUP_CREATED.to_string(),
        };
        self.groups.insert(&group)?;
        info!(group_id = %group.group_id, members = group.task_ids.len(), ?strategy, "group created");
        Ok(group)
    }

    pub fn process_group(&self, group_id: &str) -> Result<GroupReport> {
        let group = self.groups.load(group_id)?;
        let members = group
            .task_ids
            .iter()
            .map(|task_id| self.member_status(task_id))
            .collect::<Result<Vec<_>>>()?;

        let mut summary = BTreeMap::new();
        for member in &members {
            *summary.entry(member.status.clone()).or_insert(0) += 1;
        }
        debug!(group_id, ?summary, "group status collected");
        Ok(GroupReport {
            group_id: group.group_id,
            group_name: group.group_name,
            strategy: group.strategy,
            members,
            summary,
        })
    }

    pub fn list_groups(&self) -> Result<Vec<TaskGroup>> {
        self.groups.list()
    }

    fn member_status(&self, task_id: &str) -> Result<MemberStatus> {
        // Member ids are free-form; one that is not a valid record id cannot
        // have a record.
        if validate_task_id(task_id).is_err() {
            return Ok(not_found_member(task_id));
        }
        match self.states.load(task_id) {
            Ok(state) => Ok(MemberStatus {
                task_id: state.task_id,
                status: label(&state.status),
                current_iteration: Some(state.current_iteration),
                max_iterations: Some(state.max_iterations),
            }),
            Err(err) if err.is_not_found() => match self.states.find_archived(task_id)? {
                Some(record) => Ok(MemberStatus {
                    task_id: task_id.to_string(),
                    status: MEMBER_ARCHIVED.to_string(),
                    current_iteration: Some(record.state.current_iteration),
                    max_iterations: Some(record.state.max_iterations),
                }),
                None => Ok(not_found_member(task_id)),
            },
            Err(err) => Err(err),
        }
    }
}

fn not_found_member(task_id: &str) -> MemberStatus {
    MemberStatus {
        task_id: task_id.to_string(),
        status: MEMBER_NOT_FOUND.to_string(),
        current_iteration: None,
        max_iterations: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::test_support::{TestVault, sample_state};

    fn manager(vault: &TestVault) -> (GroupManager, StateStore) {
        let states = StateStore::new(&vault.paths.state_dir, &vault.paths.archive_dir);
        (
            GroupManager::new(GroupStore::new(&vault.paths.groups_dir), states.clone()),
            states,
        )
    }

    #[test]
    fn create_group_accepts_unknown_members() {
        let vault = TestVault::new();
        let (groups, _) = manager(&vault);
        let group = groups
            .create_group(vec!["x".into(), "y".into()], "batch", GroupStrategy::Parallel)
            .expect("create");
        assert_eq!(group.status, "created");
        assert!(group.group_id.starts_with("group-"));
        assert_eq!(groups.list_groups().expect("list"), vec![group]);
    }

    #[test]
    fn create_group_rejects_empty_input() {
        let vault = TestVault::new();
        let (groups, _) = manager(&vault);
        let err = groups
            .create_group(vec![], "batch", GroupStrategy::Sequential)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        let err = groups
            .create_group(vec!["a".into()], "  ", GroupStrategy::Sequential)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn process_reports_members_in_group_order() {
        let vault = TestVault::new();
        let (groups, states) = manager(&vault);

        let mut blocked = sample_state("b", 5);
        blocked.status = TaskStatus::Blocked;
        states.insert(&blocked).expect("insert b");
        states.insert(&sample_state("a", 3)).expect("insert a");
        states.insert(&sample_state("gone", 3)).expect("insert gone");
        states.move_to_archive("gone").expect("archive");

        let group = groups
            .create_group(
                vec!["b".into(), "gone".into(), "a".into(), "../x".into()],
                "mixed",
                GroupStrategy::Sequential,
            )
            .expect("create");
        let report = groups.process_group(&group.group_id).expect("process");

        let statuses: Vec<(&str, &str)> = report
            .members
            .iter()
            .map(|m| (m.task_id.as_str(), m.status.as_str()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("b", "blocked"),
                ("gone", "archived"),
                ("a", "in_progress"),
                ("../x", "not_found"),
            ]
        );
        assert_eq!(report.summary["blocked"], 1);
        assert_eq!(report.summary.len(), 4);
        assert_eq!(report.members[2].max_iterations, Some(3));
    }

    #[test]
    fn unknown_group_is_not_found() {
        let vault = TestVault::new();
        let (groups, _) = manager(&vault);
        assert!(groups.process_group("group-missing").unwrap_err().is_not_found());
    }
}
