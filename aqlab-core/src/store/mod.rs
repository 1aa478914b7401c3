//! The sole durable repository (spec.md §4.1). Every other component calls
//! typed methods on [`Store`]; nothing else touches the database directly.

mod action_log;
mod album;
mod analysis_results;
mod artifacts;
mod jobs;
mod libraries;
mod media_files;
mod models;
mod scan_runs;
mod schema;
mod settings;
pub(crate) mod tracks;

pub use album::{AlbumDetail, AlbumSummary, AlbumTrackView};
pub use analysis_results::AnalysisResultFields;
pub use models::*;
pub use tracks::TrackFields;

use aqlab_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Shared filters accepted by most `list_*` operations, following the
/// `wkmp-dr::api::filters` pattern of a single options struct rather than a
/// long positional parameter list.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardStats {
    pub library_count: i64,
    pub track_count: i64,
    pub media_file_count: i64,
    pub total_size_bytes: i64,
    pub pending_jobs: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `db_path` and apply
    /// the idempotent schema.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;
        schema::apply(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        schema::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM libraries),
                (SELECT COUNT(*) FROM tracks),
                (SELECT COUNT(*) FROM media_files WHERE status != 'deleted'),
                (SELECT COALESCE(SUM(size_bytes), 0) FROM media_files WHERE status != 'deleted')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending_jobs: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status IN ('queued', 'retry')")
                .fetch_one(&self.pool)
                .await?;

        Ok(DashboardStats {
            library_count: row.0,
            track_count: row.1,
            media_file_count: row.2,
            total_size_bytes: row.3,
            pending_jobs: pending_jobs.0,
        })
    }
}
