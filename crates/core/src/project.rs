#![forbid(unsafe_code)]

use crate::model::{
    HistoryEntry, Priority, Recurrence, Stage, Status, TaskPatch, TaskRecord, normalize_tags,
};

/// Direct fields of the candidate record after merging a patch. Everything the
/// engine owns (`id`, `version`, `history`, `created_at_ms`, `updated_at_ms`)
/// is absent on purpose.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedFields {
    pub title: String,
    pub description: Option<String>,
    pub stage_id: String,
    pub priority: Priority,
    pub effort: Option<i64>,
    pub due_date_ms: Option<i64>,
    pub tags: Vec<String>,
    pub parent_task_id: Option<String>,
    pub recurrence: Recurrence,
    pub archived: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    pub status: Status,
    pub appended: Vec<HistoryEntry>,
    pub fields: MergedFields,
}

/// Map a stage name onto a canonical status. Case-insensitive substring
/// match; unknown names fall back to backlog.
pub fn infer_status(stage_name: &str) -> Status {
    let name = stage_name.to_lowercase();
    if name.contains("progress") || name.contains("doing") || name.contains("active") {
        Status::InProgress
    } else if name.contains("done") || name.contains("complete") || name.contains("finished") {
        Status::Done
    } else if name.contains("abandon") || name.contains("cancel") {
        Status::Abandoned
    } else {
        Status::Backlog
    }
}

/// Derive the candidate state for one mutation attempt.
///
/// Pure: `now_ms` is an input and `target_stage` is the already-resolved stage
/// for `patch.stage_id`, so the retry loop can re-run this against a freshly
/// read `current` at no cost. Identical inputs produce identical output.
///
/// At most two history entries come back: a status transition, then a forced
/// `"Archived"` note when the patch sets `archived: true`. The archive note
/// records the post-transition status.
pub fn project(
    current: &TaskRecord,
    patch: &TaskPatch,
    target_stage: Option<&Stage>,
    now_ms: i64,
) -> Projection {
    let mut appended = Vec::new();

    let status = if let Some(explicit) = patch.status {
        explicit
    } else if let Some(stage) = target_stage {
        if stage.id != current.stage_id {
            infer_status(&stage.name)
        } else {
            current.status
        }
    } else {
        current.status
    };

    if status != current.status {
        appended.push(HistoryEntry {
            status,
            ts_ms: now_ms,
            note: None,
        });
    }

    if patch.archived == Some(true) {
        appended.push(HistoryEntry {
            status,
            ts_ms: now_ms,
            note: Some("Archived".to_string()),
        });
    }

    let fields = MergedFields {
        title: patch.title.clone().unwrap_or_else(|| current.title.clone()),
        description: patch
            .description
            .clone()
            .unwrap_or_else(|| current.description.clone()),
        stage_id: patch
            .stage_id
            .clone()
            .unwrap_or_else(|| current.stage_id.clone()),
        priority: patch.priority.unwrap_or(current.priority),
        effort: patch.effort.unwrap_or(current.effort),
        due_date_ms: patch.due_date_ms.unwrap_or(current.due_date_ms),
        tags: patch
            .tags
            .clone()
            .map(normalize_tags)
            .unwrap_or_else(|| current.tags.clone()),
        parent_task_id: patch
            .parent_task_id
            .clone()
            .unwrap_or_else(|| current.parent_task_id.clone()),
        recurrence: patch.recurrence.unwrap_or(current.recurrence),
        archived: patch.archived.unwrap_or(current.archived),
    };

    Projection {
        status,
        appended,
        fields,
    }
}
