//! Media File CRUD and the scanner-facing reconciliation queries
//! (spec.md §3 "Media File", §4.2).

use super::{MediaFile, MediaFileStatus, Store};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

fn row_to_media_file(row: &sqlx::sqlite::SqliteRow) -> Result<MediaFile> {
    let id: String = row.get("id");
    let library_id: String = row.get("library_id");
    let mtime: String = row.get("mtime");

    Ok(MediaFile {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        library_id: Uuid::parse_str(&library_id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        path: row.get("path"),
        basename: row.get("basename"),
        extension: row.get("extension"),
        size_bytes: row.get("size_bytes"),
        mtime: DateTime::parse_from_rfc3339(&mtime)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
        quick_hash: row.get("quick_hash"),
        full_hash: row.get("full_hash"),
        status: MediaFileStatus::parse(row.get("status")),
        error_message: row.get("error_message"),
    })
}

impl Store {
    /// Insert a new Media File row for a path first observed by the
    /// Scanner. Returns the created row.
    pub async fn upsert_new_media_file(
        &self,
        library_id: Uuid,
        path: &str,
        size_bytes: i64,
        mtime: DateTime<Utc>,
    ) -> Result<MediaFile> {
        let id = Uuid::new_v4();
        let basename = Path::new(path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = Path::new(path)
            .extension()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO media_files (id, library_id, path, basename, extension, size_bytes, mtime, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(id.to_string())
        .bind(library_id.to_string())
        .bind(path)
        .bind(&basename)
        .bind(&extension)
        .bind(size_bytes)
        .bind(mtime.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_media_file(id).await
    }

    pub async fn get_media_file(&self, id: Uuid) -> Result<MediaFile> {
        let row = sqlx::query("SELECT * FROM media_files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("media file {id}")))?;
        row_to_media_file(&row)
    }

    pub async fn find_media_file_by_path(
        &self,
        library_id: Uuid,
        path: &str,
    ) -> Result<Option<MediaFile>> {
        let row = sqlx::query("SELECT * FROM media_files WHERE library_id = ? AND path = ?")
            .bind(library_id.to_string())
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_media_file).transpose()
    }

    /// All non-deleted Media Files for a library, used by the Scanner to
    /// build its in-memory reconciliation map (spec.md §4.2 step 2).
    pub async fn list_media_files_for_library(&self, library_id: Uuid) -> Result<Vec<MediaFile>> {
        let rows = sqlx::query(
            "SELECT * FROM media_files WHERE library_id = ? AND status != 'deleted'",
        )
        .bind(library_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_media_file).collect()
    }

    /// Refresh size/mtime for a file the Scanner found changed, clear its
    /// quick hash, and mark it `pending` (spec.md §4.2 step 4).
    pub async fn mark_media_file_changed(
        &self,
        id: Uuid,
        size_bytes: i64,
        mtime: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE media_files
            SET size_bytes = ?, mtime = ?, quick_hash = NULL, status = 'pending', error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(size_bytes)
        .bind(mtime.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark every non-deleted, non-found Media File for a library as
    /// `deleted` after a completed walk (spec.md §4.2 step 5). Returns the
    /// count of rows affected.
    pub async fn mark_media_files_deleted(
        &self,
        library_id: Uuid,
        found_ids: &[Uuid],
    ) -> Result<i64> {
        let existing = self.list_media_files_for_library(library_id).await?;
        let found: std::collections::HashSet<Uuid> = found_ids.iter().copied().collect();

        let mut deleted = 0i64;
        for file in existing {
            if !found.contains(&file.id) {
                sqlx::query("UPDATE media_files SET status = 'deleted' WHERE id = ?")
                    .bind(file.id.to_string())
                    .execute(&self.pool)
                    .await?;
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    pub async fn set_media_file_status(
        &self,
        id: Uuid,
        status: MediaFileStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE media_files SET status = ?, error_message = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error_message)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_media_file_hashes(
        &self,
        id: Uuid,
        quick_hash: Option<&str>,
        full_hash: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE media_files SET quick_hash = ?, full_hash = ? WHERE id = ?")
            .bind(quick_hash)
            .bind(full_hash)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
