#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use tb_core::model::{HistoryEntry, Priority, Recurrence, Status, TaskRecord};

struct TaskRowRaw {
    id: String,
    version: i64,
    title: String,
    description: Option<String>,
    stage_id: String,
    status: String,
    priority: String,
    effort: Option<i64>,
    due_date_ms: Option<i64>,
    tags_json: String,
    parent_task_id: Option<String>,
    recurrence: String,
    archived: bool,
    created_at_ms: i64,
    updated_at_ms: i64,
}

const TASK_COLUMNS: &str = "id, version, title, description, stage_id, status, priority, effort, \
     due_date_ms, tags_json, parent_task_id, recurrence, archived, created_at_ms, updated_at_ms";

fn read_task_row(row: &Row<'_>) -> rusqlite::Result<TaskRowRaw> {
    Ok(TaskRowRaw {
        id: row.get(0)?,
        version: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        stage_id: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        effort: row.get(7)?,
        due_date_ms: row.get(8)?,
        tags_json: row.get(9)?,
        parent_task_id: row.get(10)?,
        recurrence: row.get(11)?,
        archived: row.get::<_, i64>(12)? != 0,
        created_at_ms: row.get(13)?,
        updated_at_ms: row.get(14)?,
    })
}

impl TaskRowRaw {
    fn into_record(self, history: Vec<HistoryEntry>) -> Result<TaskRecord, StoreError> {
        Ok(TaskRecord {
            id: self.id,
            version: self.version,
            title: self.title,
            description: self.description,
            stage_id: self.stage_id,
            status: decode_status(&self.status)?,
            priority: Priority::parse(&self.priority)
                .ok_or(StoreError::InvalidInput("unrecognized priority in tasks row"))?,
            effort: self.effort,
            due_date_ms: self.due_date_ms,
            tags: decode_tags(&self.tags_json)?,
            parent_task_id: self.parent_task_id,
            recurrence: Recurrence::parse(&self.recurrence)
                .ok_or(StoreError::InvalidInput("unrecognized recurrence in tasks row"))?,
            archived: self.archived,
            history,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

fn decode_status(raw: &str) -> Result<Status, StoreError> {
    Status::parse(raw).ok_or(StoreError::InvalidInput("unrecognized status in store"))
}

fn encode_tags(tags: &[String]) -> String {
    serde_json::Value::from(tags.to_vec()).to_string()
}

fn decode_tags(raw: &str) -> Result<Vec<String>, StoreError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|_| StoreError::InvalidInput("tags column is not valid json"))?;
    let Some(items) = value.as_array() else {
        return Err(StoreError::InvalidInput("tags column is not a json array"));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or(StoreError::InvalidInput("tags items must be strings"))
        })
        .collect()
}

fn history_rows(conn: &Connection, task_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT status, ts_ms, note FROM task_history WHERE task_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![task_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (status, ts_ms, note) = row?;
        out.push(HistoryEntry {
            status: decode_status(&status)?,
            ts_ms,
            note,
        });
    }
    Ok(out)
}

fn insert_history_row(
    conn: &Connection,
    task_id: &str,
    seq: i64,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO task_history(task_id, seq, status, ts_ms, note) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![task_id, seq, entry.status.as_str(), entry.ts_ms, entry.note],
    )?;
    Ok(())
}

impl SqliteStore {
    /// Assigns a `TASK-NNN` id, writes the row plus its initial history, and
    /// returns the record at version 1.
    pub fn insert_task(&mut self, request: TaskInsert) -> Result<TaskRecord, StoreError> {
        let TaskInsert {
            title,
            description,
            stage_id,
            status,
            priority,
            effort,
            due_date_ms,
            tags,
            parent_task_id,
            recurrence,
            history,
            created_at_ms,
        } = request;

        let tx = self.conn.transaction()?;
        let seq = next_counter_tx(&tx, "task_seq")?;
        let id = format!("TASK-{seq:03}");

        tx.execute(
            r#"
            INSERT INTO tasks(id, version, title, description, stage_id, status, priority, effort,
                              due_date_ms, tags_json, parent_task_id, recurrence, archived,
                              created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                id,
                1i64,
                title,
                description,
                stage_id,
                status.as_str(),
                priority.as_str(),
                effort,
                due_date_ms,
                encode_tags(&tags),
                parent_task_id,
                recurrence.as_str(),
                0i64,
                created_at_ms,
                created_at_ms
            ],
        )?;
        for (seq, entry) in history.iter().enumerate() {
            insert_history_row(&tx, &id, seq as i64, entry)?;
        }
        tx.commit()?;

        Ok(TaskRecord {
            id,
            version: 1,
            title,
            description,
            stage_id,
            status,
            priority,
            effort,
            due_date_ms,
            tags,
            parent_task_id,
            recurrence,
            archived: false,
            history,
            created_at_ms,
            updated_at_ms: created_at_ms,
        })
    }

    pub fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                read_task_row,
            )
            .optional()?;
        let Some(raw) = row else {
            return Ok(None);
        };
        let history = history_rows(&self.conn, id)?;
        Ok(Some(raw.into_record(history)?))
    }

    /// The sole mutation primitive. The write happens only if the stored
    /// version still equals `expected_version`, and the candidate history must
    /// extend the stored history; only the suffix is appended. Runs under an
    /// IMMEDIATE transaction so check-and-set is atomic across connections.
    pub fn compare_and_write(
        &mut self,
        id: &str,
        expected_version: i64,
        candidate: &TaskRecord,
    ) -> Result<TaskRecord, StoreError> {
        if candidate.id != id {
            return Err(StoreError::InvalidInput("candidate id does not match target id"));
        }
        if candidate.version != expected_version + 1 {
            return Err(StoreError::InvalidInput(
                "candidate version must advance by exactly one",
            ));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored_version = tx
            .query_row(
                "SELECT version FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        let Some(actual) = stored_version else {
            return Err(StoreError::UnknownId);
        };
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }

        let stored_history = history_rows(&tx, id)?;
        if candidate.history.len() < stored_history.len()
            || candidate.history[..stored_history.len()] != stored_history[..]
        {
            return Err(StoreError::HistoryRewrite);
        }

        tx.execute(
            r#"
            UPDATE tasks
            SET version = ?2,
                title = ?3,
                description = ?4,
                stage_id = ?5,
                status = ?6,
                priority = ?7,
                effort = ?8,
                due_date_ms = ?9,
                tags_json = ?10,
                parent_task_id = ?11,
                recurrence = ?12,
                archived = ?13,
                updated_at_ms = ?14
            WHERE id = ?1
            "#,
            params![
                id,
                candidate.version,
                candidate.title,
                candidate.description,
                candidate.stage_id,
                candidate.status.as_str(),
                candidate.priority.as_str(),
                candidate.effort,
                candidate.due_date_ms,
                encode_tags(&candidate.tags),
                candidate.parent_task_id,
                candidate.recurrence.as_str(),
                if candidate.archived { 1i64 } else { 0i64 },
                candidate.updated_at_ms
            ],
        )?;
        for (seq, entry) in candidate
            .history
            .iter()
            .enumerate()
            .skip(stored_history.len())
        {
            insert_history_row(&tx, id, seq as i64, entry)?;
        }

        tx.commit()?;
        Ok(candidate.clone())
    }

    pub fn delete_task(&mut self, id: &str) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM task_history WHERE task_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn list_tasks(&self, request: TaskListRequest) -> Result<Vec<TaskRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE (?1 IS NULL OR stage_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (archived = 0 OR ?3 != 0)
            ORDER BY id ASC
            LIMIT ?4 OFFSET ?5
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                request.stage_id,
                request.status.map(Status::as_str),
                if request.include_archived { 1i64 } else { 0i64 },
                request.limit as i64,
                request.offset as i64
            ],
            read_task_row,
        )?;

        let mut raw_rows = Vec::new();
        for row in rows {
            raw_rows.push(row?);
        }

        let mut out = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let history = history_rows(&self.conn, &raw.id)?;
            out.push(raw.into_record(history)?);
        }
        Ok(out)
    }
}
