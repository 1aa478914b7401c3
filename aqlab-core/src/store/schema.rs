//! Idempotent schema creation, applied once at `Store::connect` time.
//!
//! Every statement is `CREATE TABLE IF NOT EXISTS`, matching the migration
//! style used by `wkmp-common::db::init` — there is no versioned migration
//! runner because the schema has never shipped a breaking change yet; if
//! one is needed, `schema_version` is already in place to gate it.

use aqlab_common::Result;
use sqlx::SqlitePool;

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_schema_version(pool).await?;
    create_libraries(pool).await?;
    create_media_files(pool).await?;
    create_tracks(pool).await?;
    create_scan_runs(pool).await?;
    create_analysis_results(pool).await?;
    create_artifacts(pool).await?;
    create_jobs(pool).await?;
    create_action_log(pool).await?;
    create_settings(pool).await?;

    Ok(())
}

async fn create_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_libraries(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS libraries (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            root_path TEXT NOT NULL UNIQUE,
            scan_interval TEXT NOT NULL DEFAULT '15m',
            read_only INTEGER NOT NULL DEFAULT 1,
            output_path TEXT,
            allowed_formats TEXT,
            last_scan_at TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_media_files(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_files (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            basename TEXT NOT NULL,
            extension TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            mtime TEXT NOT NULL,
            quick_hash TEXT,
            full_hash TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            UNIQUE(library_id, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_files_library ON media_files(library_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_tracks(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            media_file_id TEXT NOT NULL UNIQUE REFERENCES media_files(id) ON DELETE CASCADE,
            duration_secs REAL NOT NULL,
            codec TEXT NOT NULL,
            sample_rate_hz INTEGER NOT NULL,
            bit_depth INTEGER NOT NULL DEFAULT 0,
            channels INTEGER NOT NULL,
            bitrate INTEGER,
            title TEXT,
            artist TEXT,
            album TEXT,
            album_artist TEXT,
            track_number INTEGER,
            disc_number INTEGER,
            year INTEGER,
            genre TEXT,
            has_artwork INTEGER NOT NULL DEFAULT 0,
            artwork_width INTEGER,
            artwork_height INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album, album_artist)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scan_runs(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_runs (
            id TEXT PRIMARY KEY,
            library_id TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'running',
            files_found INTEGER NOT NULL DEFAULT 0,
            files_new INTEGER NOT NULL DEFAULT 0,
            files_changed INTEGER NOT NULL DEFAULT 0,
            files_deleted INTEGER NOT NULL DEFAULT 0,
            files_failed INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL DEFAULT (datetime('now')),
            finished_at TEXT,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_analysis_results(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            schema_version INTEGER NOT NULL DEFAULT 1,
            lossless_score REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pass',
            integrity_ok INTEGER NOT NULL DEFAULT 1,
            decode_errors INTEGER NOT NULL DEFAULT 0,
            peak_level_db REAL NOT NULL DEFAULT 0,
            true_peak_db REAL NOT NULL DEFAULT 0,
            crest_factor_db REAL NOT NULL DEFAULT 0,
            clipped_samples INTEGER NOT NULL DEFAULT 0,
            dc_offset REAL NOT NULL DEFAULT 0,
            integrated_loudness_lufs REAL NOT NULL DEFAULT 0,
            loudness_range REAL NOT NULL DEFAULT 0,
            high_frequency_cutoff_hz REAL NOT NULL DEFAULT 0,
            spectral_rolloff_hz REAL NOT NULL DEFAULT 0,
            phase_correlation REAL NOT NULL DEFAULT 0,
            issues TEXT NOT NULL DEFAULT '[]',
            stats TEXT NOT NULL DEFAULT '{}',
            is_latest INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_results_track ON analysis_results(track_id, is_latest)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_artifacts(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            width INTEGER,
            height INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_track ON artifacts(track_id, kind)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_jobs(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            priority INTEGER NOT NULL DEFAULT 0,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            last_error TEXT,
            payload TEXT,
            scheduled_at TEXT NOT NULL DEFAULT (datetime('now')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            started_at TEXT,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, scheduled_at, priority)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_target ON jobs(target_type, target_id, job_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_action_log(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_log (
            id TEXT PRIMARY KEY,
            action_type TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT NOT NULL,
            actor TEXT NOT NULL,
            before_state TEXT NOT NULL,
            after_state TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_action_log_target ON action_log(target_type, target_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_settings(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            value_type TEXT NOT NULL DEFAULT 'string',
            category TEXT NOT NULL DEFAULT 'general'
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
