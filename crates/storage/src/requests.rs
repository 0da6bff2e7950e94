#![forbid(unsafe_code)]

use tb_core::model::{HistoryEntry, Priority, Recurrence, Status};

/// Insert payload for a new task. The store assigns the id and initializes
/// the version; everything else arrives fully resolved from the engine,
/// including the initial history.
#[derive(Clone, Debug)]
pub struct TaskInsert {
    pub title: String,
    pub description: Option<String>,
    pub stage_id: String,
    pub status: Status,
    pub priority: Priority,
    pub effort: Option<i64>,
    pub due_date_ms: Option<i64>,
    pub tags: Vec<String>,
    pub parent_task_id: Option<String>,
    pub recurrence: Recurrence,
    pub history: Vec<HistoryEntry>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct StageInsert {
    pub name: String,
    pub position: i64,
    pub color: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TaskListRequest {
    pub stage_id: Option<String>,
    pub status: Option<Status>,
    pub include_archived: bool,
    pub limit: usize,
    pub offset: usize,
}

impl Default for TaskListRequest {
    fn default() -> Self {
        Self {
            stage_id: None,
            status: None,
            include_archived: false,
            limit: 100,
            offset: 0,
        }
    }
}
