//! Error taxonomy shared by every component.
//!
//! A wait that runs out of time is not an error: `wait_for_approval` reports
//! it as a decision.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RalphError>;

#[derive(Debug, Error)]
pub enum RalphError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("malformed task {path}: {message}")]
    MalformedTask { path: PathBuf, message: String },
    #[error("malformed state {path}: {message}")]
    MalformedState { path: PathBuf, message: String },
    #[error("state {task_id} already active for {path}")]
    AlreadyExists { task_id: String, path: PathBuf },
    #[error("conflict on {task_id}: expected version {expected}, found {found}")]
    Conflict {
        task_id: String,
        expected: u64,
        found: u64,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialize: {0}")]
    Serialize(String),
}

impl RalphError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, surfaced to RPC callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::MalformedTask { .. } => "malformed_task",
            Self::MalformedState { .. } => "malformed_state",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Conflict { .. } => "conflict",
            Self::Io { .. } => "io_error",
            Self::Serialize(_) => "serialize_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Build a `map_err` adapter that tags an `io::Error` with the path involved.
pub fn io_at(path: &Path) -> impl FnOnce(io::Error) -> RalphError + '_ {
    move |source| RalphError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl From<serde_json::Error> for RalphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}
