#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Row, params};
use tb_core::model::Stage;

fn read_stage_row(row: &Row<'_>) -> rusqlite::Result<Stage> {
    Ok(Stage {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
        color: row.get(3)?,
    })
}

impl SqliteStore {
    pub fn insert_stage(&mut self, request: StageInsert) -> Result<Stage, StoreError> {
        let StageInsert {
            name,
            position,
            color,
        } = request;
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("stage name must not be empty"));
        }

        let tx = self.conn.transaction()?;
        let seq = next_counter_tx(&tx, "stage_seq")?;
        let id = format!("STAGE-{seq:03}");
        tx.execute(
            "INSERT INTO stages(id, name, position, color) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, position, color],
        )?;
        tx.commit()?;

        Ok(Stage {
            id,
            name,
            position,
            color,
        })
    }

    pub fn get_stage(&self, id: &str) -> Result<Option<Stage>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, position, color FROM stages WHERE id = ?1",
                params![id],
                read_stage_row,
            )
            .optional()?)
    }

    pub fn list_stages(&self) -> Result<Vec<Stage>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, position, color FROM stages ORDER BY position ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![], read_stage_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
