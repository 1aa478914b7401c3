//! Scan Run records (spec.md §3 "Scan Run"). Created at scan start,
//! finalized at scan end; immutable historical record thereafter.

use super::{ScanCounters, ScanRun, ScanRunStatus, Store};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_scan_run(row: &sqlx::sqlite::SqliteRow) -> Result<ScanRun> {
    let id: String = row.get("id");
    let library_id: String = row.get("library_id");
    let started_at: String = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(ScanRun {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        library_id: Uuid::parse_str(&library_id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        status: ScanRunStatus::parse(row.get("status")),
        counters: ScanCounters {
            files_found: row.get("files_found"),
            files_new: row.get("files_new"),
            files_changed: row.get("files_changed"),
            files_deleted: row.get("files_deleted"),
            files_failed: row.get("files_failed"),
        },
        started_at: parse_rfc3339(&started_at)?,
        finished_at: finished_at.map(|s| parse_rfc3339(&s)).transpose()?,
        error_message: row.get("error_message"),
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::ParseFailure(e.to_string()))
}

impl Store {
    pub async fn create_scan_run(&self, library_id: Uuid) -> Result<ScanRun> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO scan_runs (id, library_id, status) VALUES (?, ?, 'running')")
            .bind(id.to_string())
            .bind(library_id.to_string())
            .execute(&self.pool)
            .await?;
        self.get_scan_run(id).await
    }

    pub async fn get_scan_run(&self, id: Uuid) -> Result<ScanRun> {
        let row = sqlx::query("SELECT * FROM scan_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("scan run {id}")))?;
        row_to_scan_run(&row)
    }

    pub async fn finish_scan_run(
        &self,
        id: Uuid,
        counters: &ScanCounters,
        status: ScanRunStatus,
        error_message: Option<&str>,
    ) -> Result<ScanRun> {
        sqlx::query(
            r#"
            UPDATE scan_runs SET
                status = ?, files_found = ?, files_new = ?, files_changed = ?,
                files_deleted = ?, files_failed = ?, finished_at = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(counters.files_found)
        .bind(counters.files_new)
        .bind(counters.files_changed)
        .bind(counters.files_deleted)
        .bind(counters.files_failed)
        .bind(Utc::now().to_rfc3339())
        .bind(error_message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_scan_run(id).await
    }

    pub async fn list_scan_runs_for_library(&self, library_id: Uuid) -> Result<Vec<ScanRun>> {
        let rows = sqlx::query(
            "SELECT * FROM scan_runs WHERE library_id = ? ORDER BY started_at DESC",
        )
        .bind(library_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_scan_run).collect()
    }
}
