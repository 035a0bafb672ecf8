//! On-disk storage for state records: one JSON file per `task_id`.
//!
//! Active records live in the state directory, archived ones in the archive
//! directory. Writes are atomic (temp file + rename) and versioned: `save`
//! refuses to overwrite a record whose on-disk `version` moved since it was
//! loaded. The check and the rename are not one atomic step, so two writers
//! racing inside that window can still lose an update.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::health::ArchivedRecord;
use crate::core::state::RalphState;
use crate::error::{RalphError, Result, io_at};

const STATE_EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
    archive_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            archive_dir: archive_dir.into(),
        }
    }

    pub fn state_path(&self, task_id: &str) -> PathBuf {
        self.state_dir.join(format!("{task_id}.{STATE_EXT}"))
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.state_path(task_id).is_file()
    }

    /// Load an active record. Unparseable records are treated as absent.
    pub fn load(&self, task_id: &str) -> Result<RalphState> {
        validate_task_id(task_id)?;
        let path = self.state_path(task_id);
        match read_state(&path) {
            Ok(state) => Ok(state),
            Err(RalphError::MalformedState { path, message }) => {
                warn!(path = %path.display(), %message, "ignoring malformed state record");
                Err(RalphError::not_found("state", task_id))
            }
            Err(err) if err.is_not_found() => Err(RalphError::not_found("state", task_id)),
            Err(err) => Err(err),
        }
    }

    /// Persist a brand-new record; fails if one is already active for the id.
    pub fn insert(&self, state: &RalphState) -> Result<()> {
        validate_task_id(&state.task_id)?;
        let path = self.state_path(&state.task_id);
        if path.exists() {
            return Err(RalphError::AlreadyExists {
                task_id: state.task_id.clone(),
                path: state.original_path.clone(),
            });
        }
        debug!(task_id = %state.task_id, path = %path.display(), "inserting state");
        write_state(&path, state)
    }

    /// Write back a record loaded earlier, bumping its version.
    pub fn save(&self, state: &mut RalphState) -> Result<()> {
        validate_task_id(&state.task_id)?;
        let path = self.state_path(&state.task_id);
        let on_disk = self.load(&state.task_id)?;
        if on_disk.version != state.version {
            return Err(RalphError::Conflict {
                task_id: state.task_id.clone(),
                expected: state.version,
                found: on_disk.version,
            });
        }
        state.version += 1;
        debug!(
            task_id = %state.task_id,
            version = state.version,
            iteration = state.current_iteration,
            status = ?state.status,
            "saving state"
        );
        write_state(&path, state)
    }

    /// All readable active records, sorted by `task_id`.
    pub fn list_active(&self) -> Result<Vec<RalphState>> {
        let mut states: Vec<RalphState> = read_dir_states(&self.state_dir)?
            .into_iter()
            .map(|(state, _)| state)
            .collect();
        states.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(states)
    }

    /// Move the (already saved) record into the archive directory.
    ///
    /// Earlier archives of the same id are kept; the new file gets a numeric
    /// suffix instead of overwriting them.
    pub fn move_to_archive(&self, task_id: &str) -> Result<PathBuf> {
        validate_task_id(task_id)?;
        let from = self.state_path(task_id);
        if !from.is_file() {
            return Err(RalphError::not_found("state", task_id));
        }
        fs::create_dir_all(&self.archive_dir).map_err(io_at(&self.archive_dir))?;
        let to = self.free_archive_path(task_id);
        fs::rename(&from, &to).map_err(io_at(&to))?;
        debug!(task_id = %task_id, archive = %to.display(), "state archived");
        Ok(to)
    }

    /// Archived records with their archive-file modification times.
    pub fn list_archived(&self) -> Result<Vec<ArchivedRecord>> {
        Ok(read_dir_states(&self.archive_dir)?
            .into_iter()
            .map(|(state, archived_at)| ArchivedRecord { state, archived_at })
            .collect())
    }

    /// Most recent archived record for `task_id`, if any.
    pub fn find_archived(&self, task_id: &str) -> Result<Option<ArchivedRecord>> {
        Ok(self
            .list_archived()?
            .into_iter()
            .filter(|record| record.state.task_id == task_id)
            .max_by_key(|record| record.archived_at))
    }

    fn free_archive_path(&self, task_id: &str) -> PathBuf {
        let first = self.archive_dir.join(format!("{task_id}.{STATE_EXT}"));
        if !first.exists() {
            return first;
        }
        (2u32..)
            .map(|n| self.archive_dir.join(format!("{task_id}.{n}.{STATE_EXT}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }
}

pub fn validate_task_id(task_id: &str) -> Result<()> {
    validate_record_id("task_id", task_id)
}

/// Reject ids that could escape their record directory.
pub fn validate_record_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RalphError::invalid(format!("{field} must not be empty")));
    }
    if id.starts_with('.')
        || id
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(RalphError::invalid(format!(
            "{field} must be [A-Za-z0-9._-] only (got '{id}')"
        )));
    }
    Ok(())
}

fn read_state(path: &Path) -> Result<RalphState> {
    let contents = fs::read_to_string(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            RalphError::not_found("state", path.display().to_string())
        } else {
            io_at(path)(err)
        }
    })?;
    serde_json::from_str(&contents).map_err(|err| RalphError::MalformedState {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn read_dir_states(dir: &Path) -> Result<Vec<(RalphState, DateTime<Utc>)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_at(dir)(err)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_at(dir))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXT) || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .map_err(io_at(&path))?;
        match read_state(&path) {
            Ok(state) => out.push((state, DateTime::<Utc>::from(modified))),
            Err(RalphError::MalformedState { path, message }) => {
                warn!(path = %path.display(), %message, "skipping malformed state record");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(out)
}

fn write_state(path: &Path, state: &RalphState) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents).map_err(io_at(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(io_at(path))
}
