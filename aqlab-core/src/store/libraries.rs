//! Library CRUD (spec.md §3 "Library").

use super::{Library, LibraryStatus, ListOptions, Store};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_library(row: &sqlx::sqlite::SqliteRow) -> Result<Library> {
    let id: String = row.get("id");
    let allowed_formats: Option<String> = row.get("allowed_formats");
    let last_scan_at: Option<String> = row.get("last_scan_at");
    let created_at: String = row.get("created_at");

    Ok(Library {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        name: row.get("name"),
        root_path: row.get("root_path"),
        scan_interval: row.get("scan_interval"),
        read_only: row.get::<i64, _>("read_only") != 0,
        output_path: row.get("output_path"),
        allowed_formats: allowed_formats
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
        last_scan_at: last_scan_at
            .map(|s| parse_rfc3339(&s))
            .transpose()?,
        status: LibraryStatus::parse(row.get("status")),
        created_at: parse_rfc3339(&created_at)?,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::ParseFailure(e.to_string()))
}

impl Store {
    pub async fn create_library(
        &self,
        name: &str,
        root_path: &str,
        scan_interval: &str,
        read_only: bool,
        output_path: Option<&str>,
        allowed_formats: Option<&[String]>,
    ) -> Result<Library> {
        if name.trim().is_empty() {
            return Err(Error::Validation("library name must not be empty".into()));
        }
        if root_path.trim().is_empty() {
            return Err(Error::Validation("library root_path must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let allowed_json = allowed_formats
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO libraries (id, name, root_path, scan_interval, read_only, output_path, allowed_formats, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(root_path)
        .bind(scan_interval)
        .bind(read_only as i64)
        .bind(output_path)
        .bind(allowed_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                Error::Conflict(format!("library root path already registered: {root_path}"))
            } else {
                Error::Store(e)
            }
        })?;

        self.get_library(id).await
    }

    pub async fn get_library(&self, id: Uuid) -> Result<Library> {
        let row = sqlx::query("SELECT * FROM libraries WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("library {id}")))?;

        row_to_library(&row)
    }

    pub async fn list_libraries(&self, opts: &ListOptions) -> Result<Vec<Library>> {
        let limit = opts.limit.unwrap_or(i64::MAX);
        let offset = opts.offset.unwrap_or(0);

        let rows = sqlx::query("SELECT * FROM libraries ORDER BY created_at ASC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_library).collect()
    }

    pub async fn set_library_scan_status(
        &self,
        id: Uuid,
        status: LibraryStatus,
        last_scan_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE libraries SET status = ?, last_scan_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(last_scan_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_library(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM libraries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("library {id}")));
        }
        Ok(())
    }
}
