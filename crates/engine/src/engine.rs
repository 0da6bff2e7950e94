#![forbid(unsafe_code)]

use crate::error::{EngineError, invalid};
use crate::store::{RecordStore, StageDirectory};
use crate::support::now_ms_i64;
use std::time::Duration;
use tb_core::model::{
    HistoryEntry, Priority, Recurrence, Stage, Status, TaskPatch, TaskRecord, normalize_tags,
};
use tb_core::project::{self, Projection};
use tb_storage::{StoreError, TaskInsert, TaskListRequest};
use tracing::{debug, info, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_MS: u64 = 2;

/// Insert payload for `create`. Status is optional; when absent it is
/// inferred from the target stage's name.
#[derive(Clone, Debug)]
pub struct TaskInit {
    pub title: String,
    pub stage_id: String,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Priority,
    pub effort: Option<i64>,
    pub due_date_ms: Option<i64>,
    pub tags: Vec<String>,
    pub parent_task_id: Option<String>,
    pub recurrence: Recurrence,
}

impl TaskInit {
    pub fn new(title: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stage_id: stage_id.into(),
            description: None,
            status: None,
            priority: Priority::default(),
            effort: None,
            due_date_ms: None,
            tags: Vec::new(),
            parent_task_id: None,
            recurrence: Recurrence::default(),
        }
    }
}

/// Public mutation surface for task records, and the sole owner of the
/// race-prevention protocol: every change to an existing record goes through
/// the bounded read/project/compare-and-write loop in [`update`].
///
/// [`update`]: MutationEngine::update
pub struct MutationEngine<S> {
    store: S,
    max_attempts: u32,
    backoff_ms: u64,
}

impl<S: RecordStore + StageDirectory> MutationEngine<S> {
    /// Retry limits come from `TB_CAS_MAX_ATTEMPTS` / `TB_CAS_BACKOFF_MS`
    /// when set, otherwise the defaults.
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: env_knob("TB_CAS_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            backoff_ms: env_knob("TB_CAS_BACKOFF_MS", DEFAULT_BACKOFF_MS),
        }
    }

    pub fn with_limits(store: S, max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn create(&mut self, init: TaskInit) -> Result<TaskRecord, EngineError> {
        let TaskInit {
            title,
            stage_id,
            description,
            status,
            priority,
            effort,
            due_date_ms,
            tags,
            parent_task_id,
            recurrence,
        } = init;

        if title.trim().is_empty() {
            return Err(invalid("title must not be empty"));
        }
        validate_effort(effort)?;

        let stage = self.resolve_stage(&stage_id)?;
        let now_ms = now_ms_i64();
        let status = status.unwrap_or_else(|| project::infer_status(&stage.name));
        let history = vec![HistoryEntry {
            status,
            ts_ms: now_ms,
            note: None,
        }];

        let record = self.store.insert(TaskInsert {
            title,
            description,
            stage_id,
            status,
            priority,
            effort,
            due_date_ms,
            tags: normalize_tags(tags),
            parent_task_id,
            recurrence,
            history,
            created_at_ms: now_ms,
        })?;
        info!(task = %record.id, status = %record.status, "task created");
        Ok(record)
    }

    /// Applies a partial update with per-id linearizability. Each attempt
    /// re-reads the current record, re-runs the pure projection against it,
    /// and commits through compare-and-write; a version conflict means
    /// another writer committed first, so the attempt recomputes against the
    /// fresh state rather than clobbering it.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<TaskRecord, EngineError> {
        validate_patch(&patch)?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let Some(current) = self.store.get(id)? else {
                return Err(EngineError::NotFound);
            };
            let target_stage = match patch.stage_id.as_deref() {
                Some(stage_id) => Some(self.resolve_stage(stage_id)?),
                None => None,
            };

            let now_ms = now_ms_i64();
            let projection = project::project(&current, &patch, target_stage.as_ref(), now_ms);
            let candidate = apply_projection(&current, projection, now_ms);

            match self.store.compare_and_write(id, current.version, &candidate) {
                Ok(committed) => {
                    info!(task = %id, version = committed.version, "update committed");
                    return Ok(committed);
                }
                Err(StoreError::VersionConflict { expected, actual }) => {
                    if attempt >= self.max_attempts {
                        warn!(task = %id, attempts = attempt, "retries exhausted under contention");
                        return Err(EngineError::Contention { attempts: attempt });
                    }
                    debug!(task = %id, attempt, expected, actual, "version conflict, retrying");
                    std::thread::sleep(Duration::from_millis(
                        self.backoff_ms * u64::from(attempt),
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// `update` with a synthesized patch; the forced "Archived" history entry
    /// comes out of the projection.
    pub fn archive(&mut self, id: &str) -> Result<TaskRecord, EngineError> {
        self.update(
            id,
            TaskPatch {
                archived: Some(true),
                ..TaskPatch::default()
            },
        )
    }

    pub fn unarchive(&mut self, id: &str) -> Result<TaskRecord, EngineError> {
        self.update(
            id,
            TaskPatch {
                archived: Some(false),
                ..TaskPatch::default()
            },
        )
    }

    /// Hard delete; forfeits the record's history.
    pub fn delete(&mut self, id: &str) -> Result<(), EngineError> {
        if self.store.delete(id)? {
            info!(task = %id, "task deleted");
            Ok(())
        } else {
            Err(EngineError::NotFound)
        }
    }

    pub fn get(&self, id: &str) -> Result<TaskRecord, EngineError> {
        self.store.get(id)?.ok_or(EngineError::NotFound)
    }

    pub fn history(&self, id: &str) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.get(id)?.history)
    }

    pub fn list(&self, request: TaskListRequest) -> Result<Vec<TaskRecord>, EngineError> {
        Ok(self.store.list(request)?)
    }

    fn resolve_stage(&self, id: &str) -> Result<Stage, EngineError> {
        self.store
            .stage(id)?
            .ok_or_else(|| EngineError::StageNotFound(id.to_string()))
    }
}

fn apply_projection(current: &TaskRecord, projection: Projection, now_ms: i64) -> TaskRecord {
    let Projection {
        status,
        appended,
        fields,
    } = projection;

    let mut history = current.history.clone();
    history.extend(appended);

    TaskRecord {
        id: current.id.clone(),
        version: current.version + 1,
        title: fields.title,
        description: fields.description,
        stage_id: fields.stage_id,
        status,
        priority: fields.priority,
        effort: fields.effort,
        due_date_ms: fields.due_date_ms,
        tags: fields.tags,
        parent_task_id: fields.parent_task_id,
        recurrence: fields.recurrence,
        archived: fields.archived,
        history,
        created_at_ms: current.created_at_ms,
        updated_at_ms: now_ms,
    }
}

fn validate_patch(patch: &TaskPatch) -> Result<(), EngineError> {
    if patch.is_empty() {
        return Err(invalid("no fields to update"));
    }
    if let Some(title) = patch.title.as_deref()
        && title.trim().is_empty()
    {
        return Err(invalid("title must not be empty"));
    }
    if let Some(effort) = patch.effort {
        validate_effort(effort)?;
    }
    Ok(())
}

fn validate_effort(effort: Option<i64>) -> Result<(), EngineError> {
    if let Some(effort) = effort
        && !(1..=5).contains(&effort)
    {
        return Err(invalid("effort must be between 1 and 5"));
    }
    Ok(())
}

fn env_knob<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
