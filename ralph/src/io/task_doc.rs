//! Strict reader for task documents.
//!
//! A task file starts with a metadata header fenced by `---` lines:
//!
//! ```text
//! ---
//! type: email
//! priority: high
//! labels: [billing, "follow up"]
//! ---
//! free-form body
//! ```
//!
//! Header lines are `key: value`; a value wrapped in `[...]` becomes a list of
//! trimmed, quote-stripped strings. Anything else in the header, a duplicate
//! key, or a header that fails `schemas/task_meta.schema.json` is rejected as
//! `MalformedTask`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

use jsonschema::{Validator, validator_for};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::selector::PENDING_STATUS;
use crate::core::types::{Priority, parse_label};
use crate::error::{RalphError, Result, io_at};

const TASK_META_SCHEMA: &str = include_str!("../../schemas/task_meta.schema.json");
const FENCE: &str = "---";

static HEADER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_.\-]*)\s*:\s*(.*)$").expect("valid header regex")
});

/// Compiled once; a broken embedded schema surfaces as a per-file error.
static TASK_META_VALIDATOR: LazyLock<std::result::Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(TASK_META_SCHEMA).map_err(|err| format!("task schema: {err}"))?;
    validator_for(&schema).map_err(|err| format!("invalid task schema: {err}"))
});

/// Parsed task document: validated metadata plus the body text.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDocument {
    pub metadata: Map<String, Value>,
    pub body: String,
}

impl TaskDocument {
    pub fn task_type(&self) -> &str {
        self.str_field("type").unwrap_or_default()
    }

    /// Declared priority; `medium` when absent.
    pub fn priority(&self) -> Priority {
        self.str_field("priority")
            .and_then(|p| parse_label("priority", p).ok())
            .unwrap_or(Priority::Medium)
    }

    /// Declared status; `pending` when absent.
    pub fn status(&self) -> &str {
        self.str_field("status").unwrap_or(PENDING_STATUS)
    }

    pub fn created(&self) -> Option<&str> {
        self.str_field("created")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Read and parse a task file. A missing file is `NotFound`.
pub fn read_task(path: &Path) -> Result<TaskDocument> {
    let contents = fs::read_to_string(path).map_err(|err| {
        match err.kind() {
            ErrorKind::NotFound => RalphError::not_found("task", path.display().to_string()),
            ErrorKind::InvalidData => RalphError::MalformedTask {
                path: path.to_path_buf(),
                message: "not valid UTF-8".to_string(),
            },
            _ => io_at(path)(err),
        }
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "parsing task document");
    parse_task(&contents).map_err(|message| RalphError::MalformedTask {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse task text. Errors are plain messages; callers attach the path.
pub fn parse_task(contents: &str) -> std::result::Result<TaskDocument, String> {
    let normalized = contents.replace("\r\n", "\n");
    let (header, body) = split_header(&normalized)?;
    let metadata = parse_header(header)?;
    validate_metadata(&metadata)?;
    Ok(TaskDocument {
        metadata,
        body: body.to_string(),
    })
}

/// Split a document into (header, body) at the `---` fences.
fn split_header(contents: &str) -> std::result::Result<(&str, &str), String> {
    let mut offset = 0;
    let mut header_start = None;
    for line in contents.split_inclusive('\n') {
        let next = offset + line.len();
        let is_fence = line.trim_end_matches('\n') == FENCE;
        match header_start {
            None if is_fence => header_start = Some(next),
            None => return Err("missing opening '---' metadata fence".to_string()),
            Some(start) if is_fence => return Ok((&contents[start..offset], &contents[next..])),
            Some(_) => {}
        }
        offset = next;
    }
    match header_start {
        None => Err("empty document".to_string()),
        Some(_) => Err("missing closing '---' metadata fence".to_string()),
    }
}

fn parse_header(header: &str) -> std::result::Result<Map<String, Value>, String> {
    let mut map = Map::new();
    for (idx, line) in header.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let caps = HEADER_LINE_RE
            .captures(trimmed)
            .ok_or_else(|| format!("header line {}: expected 'key: value'", idx + 1))?;
        let key = caps[1].to_string();
        let value = parse_value(&caps[2]);
        if map.insert(key.clone(), value).is_some() {
            return Err(format!("header line {}: duplicate key '{key}'", idx + 1));
        }
    }
    Ok(map)
}

fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(|item| strip_quotes(item.trim()))
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect();
        return Value::Array(items);
    }
    Value::String(strip_quotes(raw).to_string())
}

fn strip_quotes(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn validate_metadata(metadata: &Map<String, Value>) -> std::result::Result<(), String> {
    let validator = TASK_META_VALIDATOR.as_ref().map_err(Clone::clone)?;
    let instance = Value::Object(metadata.clone());
    let messages: Vec<String> = validator
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(format!("metadata schema violations: {}", messages.join("; ")))
    }
}
