//! Task group descriptors: one JSON file per `group_id`.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::types::GroupStrategy;
use crate::error::{RalphError, Result, io_at};
use crate::io::state_store::validate_record_id;

pub const GROUP_CREATED: &str = "created";

/// Persisted group descriptor. Members are referenced by id only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskGroup {
    pub group_id: String,
    pub group_name: String,
    pub task_ids: Vec<String>,
    pub strategy: GroupStrategy,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct GroupStore {
    dir: PathBuf,
}

impl GroupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn group_path(&self, group_id: &str) -> PathBuf {
        self.dir.join(format!("{group_id}.json"))
    }

    pub fn insert(&self, group: &TaskGroup) -> Result<()> {
        let path = self.group_path(&group.group_id);
        fs::create_dir_all(&self.dir).map_err(io_at(&self.dir))?;
        let mut buf = serde_json::to_string_pretty(group)?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf).map_err(io_at(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(io_at(&path))?;
        debug!(group_id = %group.group_id, members = group.task_ids.len(), "group written");
        Ok(())
    }

    pub fn load(&self, group_id: &str) -> Result<TaskGroup> {
        validate_record_id("group_id", group_id)?;
        let path = self.group_path(group_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RalphError::not_found("group", group_id));
            }
            Err(err) => return Err(io_at(&path)(err)),
        };
        serde_json::from_str(&contents).map_err(|err| {
            warn!(path = %path.display(), error = %err, "ignoring malformed group record");
            RalphError::not_found("group", group_id)
        })
    }

    /// All readable groups, oldest first.
    pub fn list(&self) -> Result<Vec<TaskGroup>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_at(&self.dir)(err)),
        };
        let mut groups = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_at(&self.dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                match self.load(id) {
                    Ok(group) => groups.push(group),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
        }
        groups.sort_by(|a, b| (a.created_at, &a.group_id).cmp(&(b.created_at, &b.group_id)));
        Ok(groups)
    }
}

/// `group-<UTC timestamp>-<hash of name and members>`.
pub fn derive_group_id(name: &str, task_ids: &[String], now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    for id in task_ids {
        hasher.update(b"\0");
        hasher.update(id.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("group-{}-{}", now.format("%Y%m%d%H%M%S"), &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, created: &str) -> TaskGroup {
        TaskGroup {
            group_id: id.to_string(),
            group_name: format!("{id} name"),
            task_ids: vec!["a".to_string(), "b".to_string()],
            strategy: GroupStrategy::Sequential,
            created_at: DateTime::parse_from_rfc3339(created)
                .expect("timestamp")
                .with_timezone(&Utc),
            status: GROUP_CREATED.to_string(),
        }
    }

    #[test]
    fn insert_load_and_list() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = GroupStore::new(temp.path().join("groups"));
        store
            .insert(&group("group-2", "2026-02-02T00:00:00Z"))
            .expect("insert");
        store
            .insert(&group("group-1", "2026-01-01T00:00:00Z"))
            .expect("insert");

        assert_eq!(
            store.load("group-2").expect("load").task_ids,
            vec!["a", "b"]
        );
        let ids: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|g| g.group_id)
            .collect();
        assert_eq!(ids, vec!["group-1", "group-2"]);
    }

    #[test]
    fn missing_group_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = GroupStore::new(temp.path());
        assert!(store.load("group-x").unwrap_err().is_not_found());
    }

    #[test]
    fn group_id_has_timestamp_and_hash() {
        let now = DateTime::parse_from_rfc3339("2026-05-06T07:08:09Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let ids = vec!["a".to_string()];
        let id = derive_group_id("batch", &ids, now);
        assert!(id.starts_with("group-20260506070809-"));
        assert_eq!(id, derive_group_id("batch", &ids, now));
        assert_ne!(id, derive_group_id("other", &ids, now));
    }
}
