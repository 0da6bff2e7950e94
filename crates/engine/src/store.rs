#![forbid(unsafe_code)]

use tb_core::model::{Stage, TaskRecord};
use tb_storage::{SqliteStore, StoreError, TaskInsert, TaskListRequest};

/// Keyed task storage as the engine sees it. `compare_and_write` is the only
/// mutation primitive for existing records; there is no blind overwrite.
pub trait RecordStore {
    fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError>;
    fn insert(&mut self, request: TaskInsert) -> Result<TaskRecord, StoreError>;
    fn compare_and_write(
        &mut self,
        id: &str,
        expected_version: i64,
        candidate: &TaskRecord,
    ) -> Result<TaskRecord, StoreError>;
    fn delete(&mut self, id: &str) -> Result<bool, StoreError>;
    fn list(&self, request: TaskListRequest) -> Result<Vec<TaskRecord>, StoreError>;
}

/// Read-only stage lookup. The engine resolves the target stage on every
/// attempt so inference always sees current stage state.
pub trait StageDirectory {
    fn stage(&self, id: &str) -> Result<Option<Stage>, StoreError>;
}

impl RecordStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.get_task(id)
    }

    fn insert(&mut self, request: TaskInsert) -> Result<TaskRecord, StoreError> {
        self.insert_task(request)
    }

    fn compare_and_write(
        &mut self,
        id: &str,
        expected_version: i64,
        candidate: &TaskRecord,
    ) -> Result<TaskRecord, StoreError> {
        SqliteStore::compare_and_write(self, id, expected_version, candidate)
    }

    fn delete(&mut self, id: &str) -> Result<bool, StoreError> {
        self.delete_task(id)
    }

    fn list(&self, request: TaskListRequest) -> Result<Vec<TaskRecord>, StoreError> {
        self.list_tasks(request)
    }
}

impl StageDirectory for SqliteStore {
    fn stage(&self, id: &str) -> Result<Option<Stage>, StoreError> {
        self.get_stage(id)
    }
}
