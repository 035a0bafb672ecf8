//! Tool catalog and invocation for the service front.
//!
//! Every tool returns a JSON object. Failures become
//! `{success: false, error, error_code}` in [`failure`]; callers never see a
//! tool error as a protocol error.

use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::approval::CancelToken;
use crate::core::selector::ClaimFilter;
use crate::core::types::{CompletionStrategy, GroupStrategy, MetricsRange, Priority, TaskStatus, parse_label};
use crate::error::{RalphError, Result};
use crate::service::Ralph;
use crate::states::CreateRequest;

/// Names of every tool, in catalog order.
pub const TOOL_NAMES: [&str; 20] = [
    "list_pending_tasks",
    "claim_next_task",
    "get_task_details",
    "create_ralph_state",
    "get_ralph_state",
    "list_active_states",
    "update_progress",
    "increment_iteration",
    "check_completion",
    "should_continue",
    "archive_state",
    "create_task_group",
    "process_task_group",
    "list_task_groups",
    "check_approval_status",
    "wait_for_approval",
    "estimate_effort",
    "get_health",
    "get_performance_metrics",
    "get_stuck_tasks",
];

pub fn is_known(name: &str) -> bool {
    TOOL_NAMES.contains(&name)
}

/// Static catalog returned by `tools/list`.
pub fn catalog() -> Vec<Value> {
    let task_id = json!({ "task_id": { "type": "string" } });
    let none = json!({});
    vec![
        tool("list_pending_tasks", "List parseable task files in the inbox, plus files that failed to parse.", none.clone(), &[]),
        tool(
            "claim_next_task",
            "Pick the highest-priority, oldest pending task without an active state.",
            json!({
                "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                "type": { "type": "string" }
            }),
            &[],
        ),
        tool("get_task_details", "Metadata and body of a task file.", json!({ "path": { "type": "string" } }), &["path"]),
        tool(
            "create_ralph_state",
            "Start tracking iterations for a claimed task.",
            json!({
                "task_path": { "type": "string" },
                "prompt": { "type": "string" },
                "max_iterations": { "type": "integer", "minimum": 1 },
                "completion_strategy": { "type": "string", "enum": ["file_movement", "promise"] }
            }),
            &["task_path", "prompt"],
        ),
        tool("get_ralph_state", "Full state record for a task.", task_id.clone(), &["task_id"]),
        tool("list_active_states", "All active state records.", none.clone(), &[]),
        tool(
            "update_progress",
            "Set the status and append a history entry.",
            json!({
                "task_id": { "type": "string" },
                "status": { "type": "string", "enum": ["in_progress", "blocked", "waiting_approval", "complete"] },
                "notes": { "type": "string" }
            }),
            &["task_id", "status"],
        ),
        tool("increment_iteration", "Advance the iteration counter.", task_id.clone(), &["task_id"]),
        tool("check_completion", "Evaluate the completion strategy.", task_id.clone(), &["task_id"]),
        tool("should_continue", "Whether the loop may run another iteration.", task_id.clone(), &["task_id"]),
        tool("archive_state", "Move the state record to the archive.", task_id.clone(), &["task_id"]),
        tool(
            "create_task_group",
            "Group task ids for batch status reporting.",
            json!({
                "task_ids": { "type": "array", "items": { "type": "string" } },
                "group_name": { "type": "string" },
                "strategy": { "type": "string", "enum": ["sequential", "parallel"] }
            }),
            &["task_ids", "group_name"],
        ),
        tool(
            "process_task_group",
            "Status snapshot of every group member. Does not run any task.",
            json!({ "group_id": { "type": "string" } }),
            &["group_id"],
        ),
        tool("list_task_groups", "All task groups, oldest first.", none.clone(), &[]),
        tool("check_approval_status", "Locate the task's file in the approval folders.", task_id.clone(), &["task_id"]),
        tool(
            "wait_for_approval",
            "Block until the task is approved or rejected, or the timeout elapses.",
            json!({
                "task_id": { "type": "string" },
                "timeout_minutes": { "type": "number", "minimum": 0 },
                "poll_interval_seconds": { "type": "number", "exclusiveMinimum": 0 }
            }),
            &["task_id"],
        ),
        tool("estimate_effort", "Heuristic steps and minutes for a task file.", json!({ "task_path": { "type": "string" } }), &["task_path"]),
        tool("get_health", "Health classification of active records.", none.clone(), &[]),
        tool(
            "get_performance_metrics",
            "Metrics over archived records.",
            json!({ "range": { "type": "string", "enum": ["today", "week", "month", "all"] } }),
            &[],
        ),
        tool("get_stuck_tasks", "Active records that are blocked or out of iterations.", none, &[]),
    ]
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// Run one tool. The returned object always carries `success`.
pub fn call(ralph: &Ralph, cancel: &CancelToken, name: &str, arguments: &Map<String, Value>) -> Value {
    match invoke(ralph, cancel, name, &Args(arguments)) {
        Ok(value) => success(value),
        Err(err) => failure(&err),
    }
}

pub fn failure(err: &RalphError) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "error_code": err.code(),
    })
}

fn success(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({ "success": true, "result": other }),
    }
}

fn invoke(ralph: &Ralph, cancel: &CancelToken, name: &str, args: &Args<'_>) -> Result<Value> {
    match name {
        "list_pending_tasks" => {
            let listing = ralph.tasks.list_pending()?;
            Ok(json!({
                "count": listing.tasks.len(),
                "tasks": to_value(&listing.tasks)?,
                "skipped": to_value(&listing.skipped)?,
            }))
        }
        "claim_next_task" => {
            let filter = ClaimFilter {
                priority: args
                    .optional::<String>("priority")?
                    .map(|p| parse_label::<Priority>("priority", &p))
                    .transpose()?,
                task_type: args.optional("type")?,
            };
            match ralph.claim_next(&filter)? {
                Some(task) => Ok(json!({ "path": to_value(&task.path)?, "task": to_value(&task)? })),
                None => Ok(json!({ "path": null, "task": null, "message": "no tasks available" })),
            }
        }
        "get_task_details" => to_value(&ralph.tasks.get_details(&args.required::<PathBuf>("path")?)?),
        "create_ralph_state" => {
            let strategy = args
                .optional::<String>("completion_strategy")?
                .map(|s| parse_label::<CompletionStrategy>("completion_strategy", &s))
                .transpose()?;
            let state = ralph.create_state(CreateRequest {
                path: args.required("task_path")?,
                prompt: args.required("prompt")?,
                max_iterations: args.optional("max_iterations")?,
                strategy,
            })?;
            to_value(&state)
        }
        "get_ralph_state" => to_value(&ralph.states.get_state(&args.task_id()?)?),
        "list_active_states" => {
            let states = ralph.states.list_active()?;
            Ok(json!({ "count": states.len(), "states": to_value(&states)? }))
        }
        "update_progress" => {
            let status: TaskStatus = parse_label("status", &args.required::<String>("status")?)?;
            let notes = args.optional("notes")?;
            to_value(&ralph.states.update_progress(&args.task_id()?, status, notes)?)
        }
        "increment_iteration" => to_value(&ralph.states.increment_iteration(&args.task_id()?)?),
        "check_completion" => to_value(&ralph.states.check_completion(&args.task_id()?)?),
        "should_continue" => to_value(&ralph.states.should_continue(&args.task_id()?)?),
        "archive_state" => to_value(&ralph.states.archive(&args.task_id()?)?),
        "create_task_group" => {
            let strategy = match args.optional::<String>("strategy")? {
                Some(s) => parse_label("strategy", &s)?,
                None => GroupStrategy::Sequential,
            };
            let group = ralph.groups.create_group(
                args.required("task_ids")?,
                &args.required::<String>("group_name")?,
                strategy,
            )?;
            to_value(&group)
        }
        "process_task_group" => {
            to_value(&ralph.groups.process_group(&args.required::<String>("group_id")?)?)
        }
        "list_task_groups" => {
            let groups = ralph.groups.list_groups()?;
            Ok(json!({ "count": groups.len(), "groups": to_value(&groups)? }))
        }
        "check_approval_status" => to_value(&ralph.approval.check_status(&args.task_id()?)?),
        "wait_for_approval" => {
            let options = ralph.wait_options(
                args.optional("timeout_minutes")?,
                args.optional("poll_interval_seconds")?,
            )?;
            cancel.reset();
            to_value(&ralph.approval.wait_for_approval(&args.task_id()?, &options, cancel)?)
        }
        "estimate_effort" => to_value(&ralph.estimator.estimate(&args.required::<PathBuf>("task_path")?)?),
        "get_health" => to_value(&ralph.health.get_health()?),
        "get_performance_metrics" => {
            let range = match args.optional::<String>("range")? {
                Some(r) => parse_label("range", &r)?,
                None => MetricsRange::All,
            };
            to_value(&ralph.health.get_performance_metrics(range)?)
        }
        "get_stuck_tasks" => {
            let tasks = ralph.health.get_stuck_tasks()?;
            Ok(json!({ "count": tasks.len(), "tasks": to_value(&tasks)? }))
        }
        other => Err(RalphError::invalid(format!("unknown tool: {other}"))),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Typed access to a tool's `arguments` object.
struct Args<'a>(&'a Map<String, Value>);

impl Args<'_> {
    fn required<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.optional(key)?
            .ok_or_else(|| RalphError::invalid(format!("missing required argument '{key}'")))
    }

    /// Absent and `null` are both `None`.
    fn optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|err| RalphError::invalid(format!("argument '{key}': {err}"))),
        }
    }

    fn task_id(&self) -> Result<String> {
        self.required("task_id")
    }
}
