//! Action Log (spec.md §3 "Action Log"). Append-only audit trail of
//! mutations made by the system or an operator; entries are never edited
//! or deleted once written.

use super::{ActionLogEntry, Store};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ActionLogEntry> {
    let id: String = row.get("id");
    let target_id: String = row.get("target_id");
    let before_state: String = row.get("before_state");
    let after_state: String = row.get("after_state");
    let created_at: String = row.get("created_at");

    Ok(ActionLogEntry {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        action_type: row.get("action_type"),
        target_type: row.get("target_type"),
        target_id: Uuid::parse_str(&target_id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        actor: row.get("actor"),
        before_state: serde_json::from_str(&before_state)
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
        after_state: serde_json::from_str(&after_state)
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
    })
}

impl Store {
    pub async fn record_action(
        &self,
        action_type: &str,
        target_type: &str,
        target_id: Uuid,
        actor: &str,
        before_state: &serde_json::Value,
        after_state: &serde_json::Value,
    ) -> Result<ActionLogEntry> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO action_log (id, action_type, target_type, target_id, actor, before_state, after_state)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(action_type)
        .bind(target_type)
        .bind(target_id.to_string())
        .bind(actor)
        .bind(before_state.to_string())
        .bind(after_state.to_string())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM action_log WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row_to_entry(&row)
    }

    pub async fn list_action_logs(
        &self,
        target_type: Option<&str>,
        target_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ActionLogEntry>> {
        let rows = match (target_type, target_id) {
            (Some(tt), Some(tid)) => {
                sqlx::query(
                    "SELECT * FROM action_log WHERE target_type = ? AND target_id = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(tt)
                .bind(tid.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(tt), None) => {
                sqlx::query(
                    "SELECT * FROM action_log WHERE target_type = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(tt)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query("SELECT * FROM action_log ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_entry).collect()
    }
}
