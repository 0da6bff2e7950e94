#![forbid(unsafe_code)]

//! JSON boundary for the external HTTP layer: request parsing that tells
//! "absent" apart from "null" (a PATCH clears a field with an explicit null),
//! and response rendering.

use crate::engine::TaskInit;
use crate::error::{EngineError, invalid};
use crate::support::ts_ms_to_rfc3339;
use serde_json::{Map, Value, json};
use tb_core::model::{HistoryEntry, Priority, Recurrence, Stage, Status, TaskPatch, TaskRecord};

pub fn parse_init(value: &Value) -> Result<TaskInit, EngineError> {
    let args = as_object(value)?;
    Ok(TaskInit {
        title: require_string(args, "title")?,
        stage_id: require_string(args, "stageId")?,
        description: optional_string(args, "description")?,
        status: optional_status(args, "status")?,
        priority: optional_priority(args, "priority")?.unwrap_or_default(),
        effort: optional_i64(args, "effort")?,
        due_date_ms: optional_i64(args, "dueDateMs")?,
        tags: optional_string_array(args, "tags")?.unwrap_or_default(),
        parent_task_id: optional_string(args, "parentTaskId")?,
        recurrence: optional_recurrence(args, "recurrence")?.unwrap_or_default(),
    })
}

pub fn parse_patch(value: &Value) -> Result<TaskPatch, EngineError> {
    let args = as_object(value)?;
    Ok(TaskPatch {
        title: optional_non_null_string(args, "title")?,
        description: clearable_string(args, "description")?,
        stage_id: optional_non_null_string(args, "stageId")?,
        status: optional_status(args, "status")?,
        priority: optional_priority(args, "priority")?,
        effort: clearable_i64(args, "effort")?,
        due_date_ms: clearable_i64(args, "dueDateMs")?,
        tags: optional_string_array(args, "tags")?,
        parent_task_id: clearable_string(args, "parentTaskId")?,
        recurrence: optional_recurrence(args, "recurrence")?,
        archived: optional_bool(args, "archived")?,
    })
}

pub fn task_to_json(record: &TaskRecord) -> Value {
    json!({
        "id": record.id,
        "version": record.version,
        "title": record.title,
        "description": record.description,
        "stageId": record.stage_id,
        "status": record.status.as_str(),
        "priority": record.priority.as_str(),
        "effort": record.effort,
        "dueDateMs": record.due_date_ms,
        "dueDate": record.due_date_ms.map(ts_ms_to_rfc3339),
        "tags": record.tags,
        "parentTaskId": record.parent_task_id,
        "recurrence": record.recurrence.as_str(),
        "archived": record.archived,
        "history": history_to_json(&record.history),
        "createdAtMs": record.created_at_ms,
        "createdAt": ts_ms_to_rfc3339(record.created_at_ms),
        "updatedAtMs": record.updated_at_ms,
        "updatedAt": ts_ms_to_rfc3339(record.updated_at_ms),
    })
}

pub fn history_to_json(history: &[HistoryEntry]) -> Value {
    Value::Array(
        history
            .iter()
            .map(|entry| {
                json!({
                    "status": entry.status.as_str(),
                    "tsMs": entry.ts_ms,
                    "ts": ts_ms_to_rfc3339(entry.ts_ms),
                    "note": entry.note,
                })
            })
            .collect(),
    )
}

pub fn stage_to_json(stage: &Stage) -> Value {
    json!({
        "id": stage.id,
        "name": stage.name,
        "position": stage.position,
        "color": stage.color,
    })
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, EngineError> {
    value
        .as_object()
        .ok_or_else(|| invalid("payload must be a json object"))
}

fn require_string(args: &Map<String, Value>, key: &str) -> Result<String, EngineError> {
    match args.get(key) {
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
        None => Err(invalid(format!("{key} is required"))),
    }
}

fn optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, EngineError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}

fn optional_non_null_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Null) => Err(invalid(format!("{key} cannot be null"))),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}

fn clearable_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Option<String>>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(v)) => Ok(Some(Some(v.clone()))),
        Some(_) => Err(invalid(format!("{key} must be a string or null"))),
    }
}

fn optional_i64(args: &Map<String, Value>, key: &str) -> Result<Option<i64>, EngineError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{key} must be an integer"))),
    }
}

fn clearable_i64(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Option<i64>>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(value) => value
            .as_i64()
            .map(|v| Some(Some(v)))
            .ok_or_else(|| invalid(format!("{key} must be an integer or null"))),
    }
}

fn optional_bool(args: &Map<String, Value>, key: &str) -> Result<Option<bool>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(_) => Err(invalid(format!("{key} must be a boolean"))),
    }
}

fn optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, EngineError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    let Some(items) = value.as_array() else {
        return Err(invalid(format!("{key} must be an array of strings")));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(invalid(format!("{key} items must be strings")));
        };
        out.push(s.to_string());
    }
    Ok(Some(out))
}

fn optional_status(args: &Map<String, Value>, key: &str) -> Result<Option<Status>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::String(raw)) => Status::parse(raw).map(Some).ok_or_else(|| {
            invalid(format!(
                "{key} must be one of backlog|in_progress|done|abandoned"
            ))
        }),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}

fn optional_priority(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Priority>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::String(raw)) => Priority::parse(raw)
            .map(Some)
            .ok_or_else(|| invalid(format!("{key} must be one of low|normal|high|critical"))),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}

fn optional_recurrence(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Recurrence>, EngineError> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::String(raw)) => Recurrence::parse(raw)
            .map(Some)
            .ok_or_else(|| invalid(format!("{key} must be one of none|daily|weekly|monthly"))),
        Some(_) => Err(invalid(format!("{key} must be a string"))),
    }
}
