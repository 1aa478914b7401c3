//! Job queue + worker pool (spec.md §4.4).

mod backoff;
mod log_buffer;

pub use backoff::{backoff_for_attempt, decode_retry_backoff};
pub use log_buffer::{LogBuffer, LogEntry};

use crate::store::{Job, JobStatus, JobType, Store};
use aqlab_common::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A sink bound to one job's log buffer slot, passed to executors so they
/// don't need to know about job ids or the buffer's internals.
#[derive(Clone)]
pub struct JobLogger {
    buffer: LogBuffer,
    job_id: Uuid,
}

impl JobLogger {
    #[cfg(test)]
    pub fn for_test(buffer: LogBuffer, job_id: Uuid) -> Self {
        Self { buffer, job_id }
    }

    pub fn log(&self, level: &str, module: &str, message: impl Into<String>) {
        self.buffer.push(self.job_id, level, module, message, None);
    }

    pub fn log_with_details(
        &self,
        level: &str,
        module: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.buffer
            .push(self.job_id, level, module, message, Some(details));
    }
}

/// Dispatches one job type to its processing logic. Implemented by the
/// Probe-driven `analyze` executor and the Analysis-pipeline `audioscan`
/// executor; kept as a trait so the queue crate module doesn't need to
/// depend on their internals.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job, logger: JobLogger, cancel: &CancellationToken) -> Result<()>;
}

pub struct WorkerPool {
    store: Store,
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
    log_buffer: LogBuffer,
    worker_count: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(store: Store, worker_count: usize, poll_interval: Duration) -> Self {
        Self {
            store,
            executors: HashMap::new(),
            log_buffer: LogBuffer::default(),
            worker_count,
            poll_interval,
        }
    }

    pub fn register_executor(&mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) {
        self.executors.insert(job_type, executor);
    }

    pub fn log_buffer(&self) -> LogBuffer {
        self.log_buffer.clone()
    }

    /// Reset any job stranded `running` from a prior crash back to `queued`.
    /// Call once before `run`.
    pub async fn reap_stranded_jobs(&self) -> Result<i64> {
        self.store.reap_stranded_jobs().await
    }

    /// Run `worker_count` polling loops until `cancel` fires. Each worker
    /// claims across every registered job type in turn so a quiet queue for
    /// one type doesn't starve another.
    pub async fn run(&self, cancel: CancellationToken) {
        let job_types: Vec<JobType> = self.executors.keys().copied().collect();
        let mut handles = Vec::with_capacity(self.worker_count);

        for worker_id in 0..self.worker_count {
            let store = self.store.clone();
            let executors = self.executors.clone();
            let log_buffer = self.log_buffer.clone();
            let poll_interval = self.poll_interval;
            let job_types = job_types.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, store, executors, log_buffer, job_types, poll_interval, cancel)
                    .await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    store: Store,
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
    log_buffer: LogBuffer,
    job_types: Vec<JobType>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::info!(worker_id, "worker stopping on cancellation");
            return;
        }

        let mut claimed = None;
        for job_type in &job_types {
            match store.claim_next_job(*job_type).await {
                Ok(Some(job)) => {
                    claimed = Some(job);
                    break;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "failed to claim job");
                }
            }
        }

        let Some(job) = claimed else {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
            continue;
        };

        log_buffer.start_job(job.id);
        let logger = JobLogger {
            buffer: log_buffer.clone(),
            job_id: job.id,
        };

        let Some(executor) = executors.get(&job.job_type) else {
            tracing::error!(worker_id, job_id = %job.id, job_type = ?job.job_type, "no executor registered");
            continue;
        };

        tracing::info!(worker_id, job_id = %job.id, job_type = ?job.job_type, "claimed job");
        let result = executor.execute(&job, logger, &cancel).await;

        match result {
            Ok(()) => {
                log_buffer.set_status(job.id, JobStatus::Success);
                if let Err(e) = store.complete_job_success(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "failed to record job success");
                }
            }
            Err(e) => {
                let next_scheduled_at =
                    chrono::Utc::now() + backoff_for_attempt(job.attempts + 1);
                match store
                    .record_job_failure(job.id, &e.to_string(), next_scheduled_at)
                    .await
                {
                    Ok(updated) => log_buffer.set_status(job.id, updated.status),
                    Err(store_err) => {
                        tracing::error!(job_id = %job.id, error = %store_err, "failed to record job failure");
                    }
                }
            }
        }
    }
}
