//! Job queue persistence (spec.md §3 "Job", §4.4).
//!
//! `claim_next_job` is the one operation in this crate with a genuine
//! concurrency contract: at most one caller may ever observe a given job
//! as `running` (spec.md §8). It is implemented as a single `UPDATE ...
//! WHERE id = (SELECT ...) RETURNING *` statement, which SQLite executes
//! under its single-writer serialization — there is no read-then-write
//! window for a second connection to interleave into.

use super::{Job, JobStatus, JobType, Store};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let id: String = row.get("id");
    let job_type: String = row.get("job_type");
    let target_id: String = row.get("target_id");
    let scheduled_at: String = row.get("scheduled_at");
    let created_at: String = row.get("created_at");
    let started_at: Option<String> = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");
    let payload: Option<String> = row.get("payload");

    Ok(Job {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        job_type: JobType::parse(&job_type)
            .ok_or_else(|| Error::ParseFailure(format!("unknown job type: {job_type}")))?,
        target_type: row.get("target_type"),
        target_id: Uuid::parse_str(&target_id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        status: JobStatus::parse(row.get("status")),
        priority: row.get("priority"),
        attempts: row.get("attempts"),
        max_attempts: row.get("max_attempts"),
        last_error: row.get("last_error"),
        payload: payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
        scheduled_at: parse_rfc3339(&scheduled_at)?,
        created_at: parse_rfc3339(&created_at)?,
        started_at: started_at.map(|s| parse_rfc3339(&s)).transpose()?,
        finished_at: finished_at.map(|s| parse_rfc3339(&s)).transpose()?,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::ParseFailure(e.to_string()))
}

impl Store {
    pub async fn enqueue_job(
        &self,
        job_type: JobType,
        target_type: &str,
        target_id: Uuid,
        priority: i64,
        max_attempts: i64,
        payload: Option<&serde_json::Value>,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Job> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, target_type, target_id, priority, max_attempts, payload, scheduled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(job_type.as_str())
        .bind(target_type)
        .bind(target_id.to_string())
        .bind(priority)
        .bind(max_attempts)
        .bind(payload.map(|p| p.to_string()))
        .bind(scheduled_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_job(id).await
    }

    /// True iff a job of `job_type` targeting `target_id` is already
    /// queued or retrying (spec.md §4.2 step 4: "Do not enqueue a
    /// duplicate job if one is already queued for this file").
    pub async fn has_pending_job_for_target(
        &self,
        job_type: JobType,
        target_id: Uuid,
    ) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE job_type = ? AND target_id = ? AND status IN ('queued', 'retry', 'running')
            "#,
        )
        .bind(job_type.as_str())
        .bind(target_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("job {id}")))?;
        row_to_job(&row)
    }

    /// Atomically claim the single highest-priority, oldest-scheduled
    /// queued (or ready-to-retry) job of `job_type`, transition it to
    /// `running`, and stamp `started_at`. Returns `None` if none is ready.
    pub async fn claim_next_job(&self, job_type: JobType) -> Result<Option<Job>> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            r#"
            UPDATE jobs SET status = 'running', started_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE job_type = ?
                  AND status IN ('queued', 'retry')
                  AND scheduled_at <= ?
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(job_type.as_str())
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn complete_job_success(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'success', finished_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt. If `attempts` has now reached
    /// `max_attempts` the job becomes terminally `failed`; otherwise it
    /// goes back to `queued` (logically `retry`) with `scheduled_at` bumped
    /// by the backoff for the new attempt count (spec.md §4.4).
    pub async fn record_job_failure(
        &self,
        id: Uuid,
        error: &str,
        next_scheduled_at: DateTime<Utc>,
    ) -> Result<Job> {
        let job = self.get_job(id).await?;
        let attempts = job.attempts + 1;

        if attempts >= job.max_attempts {
            sqlx::query(
                "UPDATE jobs SET attempts = ?, last_error = ?, status = 'failed', finished_at = ? WHERE id = ?",
            )
            .bind(attempts)
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE jobs SET attempts = ?, last_error = ?, status = 'queued', scheduled_at = ? WHERE id = ?",
            )
            .bind(attempts)
            .bind(error)
            .bind(next_scheduled_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        }

        self.get_job(id).await
    }

    /// Reset any job stranded in `running` back to `queued` — run once at
    /// startup before the worker pool begins polling (spec.md §4.4
    /// "a startup reaper may reset stranded running jobs to queued").
    pub async fn reap_stranded_jobs(&self) -> Result<i64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', started_at = NULL WHERE status = 'running'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_job).collect()
    }
}
