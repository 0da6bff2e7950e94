#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use tb_core::model::{
    HistoryEntry, Priority, Recurrence, Stage, Status, TaskPatch, TaskRecord,
};
use tb_engine::{EngineError, MutationEngine, RecordStore, StageDirectory, TaskInit};
use tb_storage::{SqliteStore, StageInsert, StoreError, TaskInsert, TaskListRequest};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("tb_engine_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn seed_stage(store: &mut SqliteStore, name: &str, position: i64) -> Stage {
    store
        .insert_stage(StageInsert {
            name: name.to_string(),
            position,
            color: None,
        })
        .expect("insert stage")
}

fn engine_at(dir: &Path) -> MutationEngine<SqliteStore> {
    MutationEngine::with_limits(SqliteStore::open(dir).expect("open store"), 5, 0)
}

#[test]
fn create_infers_status_from_stage_name() {
    let dir = temp_dir("create_infers_status_from_stage_name");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "In Progress - Active", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit::new("Spike the layout", stage.id.clone()))
        .expect("create task");
    assert_eq!(task.status, Status::InProgress);
    assert_eq!(task.version, 1);
    assert_eq!(task.history.len(), 1);
    assert_eq!(task.history[0].status, Status::InProgress);
    assert_eq!(task.history[0].note, None);
}

#[test]
fn create_with_explicit_status_skips_inference() {
    let dir = temp_dir("create_with_explicit_status_skips_inference");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "Done", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit {
            status: Some(Status::Backlog),
            ..TaskInit::new("Not started", stage.id.clone())
        })
        .expect("create task");
    assert_eq!(task.status, Status::Backlog);
    assert_eq!(task.history.len(), 1);
    assert_eq!(task.history[0].status, Status::Backlog);
}

#[test]
fn create_validates_before_touching_the_store() {
    let dir = temp_dir("create_validates_before_touching_the_store");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "Backlog", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let err = engine
        .create(TaskInit::new("   ", stage.id.clone()))
        .expect_err("blank title");
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create(TaskInit {
            effort: Some(9),
            ..TaskInit::new("Too big", stage.id.clone())
        })
        .expect_err("effort out of range");
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .create(TaskInit::new("Orphan", "STAGE-404"))
        .expect_err("missing stage");
    assert!(matches!(err, EngineError::StageNotFound(_)));

    assert!(
        engine
            .list(TaskListRequest::default())
            .expect("list")
            .is_empty()
    );
}

#[test]
fn noop_update_advances_version_without_history() {
    let dir = temp_dir("noop_update_advances_version_without_history");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "Backlog", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit::new("Same title", stage.id.clone()))
        .expect("create task");
    let updated = engine
        .update(
            &task.id,
            TaskPatch {
                title: Some("Same title".to_string()),
                ..TaskPatch::default()
            },
        )
        .expect("noop update");

    assert_eq!(updated.version, 2);
    assert_eq!(updated.status, Status::Backlog);
    assert_eq!(updated.history.len(), 1);
    assert!(updated.updated_at_ms >= task.updated_at_ms);
}

#[test]
fn stage_move_infers_status_and_logs_transition() {
    let dir = temp_dir("stage_move_infers_status_and_logs_transition");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let backlog = seed_stage(&mut store, "Backlog", 0);
    let done = seed_stage(&mut store, "Done", 1);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit::new("Move me", backlog.id.clone()))
        .expect("create task");
    assert_eq!(task.status, Status::Backlog);

    let moved = engine
        .update(
            &task.id,
            TaskPatch {
                stage_id: Some(done.id.clone()),
                ..TaskPatch::default()
            },
        )
        .expect("move task");
    assert_eq!(moved.status, Status::Done);
    assert_eq!(moved.stage_id, done.id);
    assert_eq!(moved.history.len(), 2);
    assert_eq!(moved.history[1].status, Status::Done);

    let err = engine
        .update(
            &task.id,
            TaskPatch {
                stage_id: Some("STAGE-404".to_string()),
                ..TaskPatch::default()
            },
        )
        .expect_err("move to missing stage");
    assert!(matches!(err, EngineError::StageNotFound(_)));
}

#[test]
fn archive_always_logs_even_when_status_is_unchanged() {
    let dir = temp_dir("archive_always_logs_even_when_status_is_unchanged");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "Done", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit::new("Finished work", stage.id.clone()))
        .expect("create task");
    assert_eq!(task.status, Status::Done);

    let archived = engine.archive(&task.id).expect("archive");
    assert!(archived.archived);
    assert_eq!(archived.status, Status::Done);
    assert_eq!(archived.version, 2);
    assert_eq!(archived.history.len(), 2);
    assert_eq!(archived.history[1].status, Status::Done);
    assert_eq!(archived.history[1].note.as_deref(), Some("Archived"));

    let restored = engine.unarchive(&task.id).expect("unarchive");
    assert!(!restored.archived);
    assert_eq!(restored.version, 3);
    assert_eq!(restored.history.len(), 2);
}

#[test]
fn missing_tasks_surface_not_found() {
    let dir = temp_dir("missing_tasks_surface_not_found");
    let mut engine = engine_at(&dir);

    let patch = TaskPatch {
        title: Some("anything".to_string()),
        ..TaskPatch::default()
    };
    assert!(matches!(
        engine.update("TASK-404", patch),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        engine.archive("TASK-404"),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        engine.delete("TASK-404"),
        Err(EngineError::NotFound)
    ));
    assert!(matches!(engine.get("TASK-404"), Err(EngineError::NotFound)));
    assert!(matches!(
        engine.history("TASK-404"),
        Err(EngineError::NotFound)
    ));
}

#[test]
fn delete_forfeits_the_record_and_its_history() {
    let dir = temp_dir("delete_forfeits_the_record_and_its_history");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "Backlog", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit::new("Short lived", stage.id.clone()))
        .expect("create task");
    engine
        .update(
            &task.id,
            TaskPatch {
                status: Some(Status::Done),
                ..TaskPatch::default()
            },
        )
        .expect("update");

    engine.delete(&task.id).expect("delete");
    assert!(matches!(engine.get(&task.id), Err(EngineError::NotFound)));
    assert!(matches!(
        engine.history(&task.id),
        Err(EngineError::NotFound)
    ));
}

#[test]
fn empty_patch_is_rejected_without_consuming_a_version() {
    let dir = temp_dir("empty_patch_is_rejected_without_consuming_a_version");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let stage = seed_stage(&mut store, "Backlog", 0);
    let mut engine = MutationEngine::with_limits(store, 5, 0);

    let task = engine
        .create(TaskInit::new("Untouched", stage.id.clone()))
        .expect("create task");
    let err = engine
        .update(&task.id, TaskPatch::default())
        .expect_err("empty patch");
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .update(
            &task.id,
            TaskPatch {
                effort: Some(Some(0)),
                ..TaskPatch::default()
            },
        )
        .expect_err("effort out of range");
    assert!(matches!(err, EngineError::Validation(_)));

    assert_eq!(engine.get(&task.id).expect("get").version, 1);
}

// Store double that reports a version conflict on every write; drives the
// retry loop to exhaustion without needing real contention.
struct ConflictStore {
    record: TaskRecord,
    write_attempts: u32,
}

impl ConflictStore {
    fn new() -> Self {
        Self {
            record: TaskRecord {
                id: "TASK-001".to_string(),
                version: 1,
                title: "Contended".to_string(),
                description: None,
                stage_id: "STAGE-001".to_string(),
                status: Status::Backlog,
                priority: Priority::Normal,
                effort: None,
                due_date_ms: None,
                tags: Vec::new(),
                parent_task_id: None,
                recurrence: Recurrence::None,
                archived: false,
                history: vec![HistoryEntry {
                    status: Status::Backlog,
                    ts_ms: 1_000,
                    note: None,
                }],
                created_at_ms: 1_000,
                updated_at_ms: 1_000,
            },
            write_attempts: 0,
        }
    }
}

impl RecordStore for ConflictStore {
    fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok((id == self.record.id).then(|| self.record.clone()))
    }

    fn insert(&mut self, _request: TaskInsert) -> Result<TaskRecord, StoreError> {
        Err(StoreError::InvalidInput("insert is not part of this double"))
    }

    fn compare_and_write(
        &mut self,
        _id: &str,
        expected_version: i64,
        _candidate: &TaskRecord,
    ) -> Result<TaskRecord, StoreError> {
        self.write_attempts += 1;
        Err(StoreError::VersionConflict {
            expected: expected_version,
            actual: expected_version + 1,
        })
    }

    fn delete(&mut self, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn list(&self, _request: TaskListRequest) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(Vec::new())
    }
}

impl StageDirectory for ConflictStore {
    fn stage(&self, _id: &str) -> Result<Option<Stage>, StoreError> {
        Ok(None)
    }
}

#[test]
fn contention_surfaces_after_bounded_retries() {
    let mut engine = MutationEngine::with_limits(ConflictStore::new(), 3, 0);
    let err = engine
        .update(
            "TASK-001",
            TaskPatch {
                priority: Some(Priority::High),
                ..TaskPatch::default()
            },
        )
        .expect_err("must exhaust retries");
    match err {
        EngineError::Contention { attempts } => assert_eq!(attempts, 3),
        other => panic!("expected Contention, got {other:?}"),
    }
    assert_eq!(engine.into_store().write_attempts, 3);
}
