//! Per-job log buffer (spec.md §4.4). An in-memory, thread-safe map from
//! job id to a ring of log entries, bounded by job count with FIFO eviction.
//! Guarded by a read/write lock so readers never block writers for long —
//! the critical section is just a slice copy (spec.md §5 shared-resource
//! policy).

use crate::store::JobStatus;
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub module: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

struct JobLog {
    entries: Vec<LogEntry>,
    status: JobStatus,
}

struct Inner {
    capacity: usize,
    jobs: HashMap<Uuid, JobLog>,
    eviction_order: VecDeque<Uuid>,
}

#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<RwLock<Inner>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                capacity,
                jobs: HashMap::new(),
                eviction_order: VecDeque::new(),
            })),
        }
    }

    /// Begin tracking a job, evicting the oldest-started job if at capacity.
    pub fn start_job(&self, job_id: Uuid) {
        let mut inner = self.inner.write().expect("log buffer lock poisoned");
        if inner.jobs.contains_key(&job_id) {
            return;
        }
        if inner.jobs.len() >= inner.capacity {
            if let Some(victim) = inner.eviction_order.pop_front() {
                inner.jobs.remove(&victim);
            }
        }
        inner.eviction_order.push_back(job_id);
        inner.jobs.insert(
            job_id,
            JobLog {
                entries: Vec::new(),
                status: JobStatus::Running,
            },
        );
    }

    pub fn push(
        &self,
        job_id: Uuid,
        level: impl Into<String>,
        module: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        let mut inner = self.inner.write().expect("log buffer lock poisoned");
        if let Some(log) = inner.jobs.get_mut(&job_id) {
            log.entries.push(LogEntry {
                timestamp: Utc::now(),
                level: level.into(),
                module: module.into(),
                message: message.into(),
                details,
            });
        }
    }

    pub fn set_status(&self, job_id: Uuid, status: JobStatus) {
        let mut inner = self.inner.write().expect("log buffer lock poisoned");
        if let Some(log) = inner.jobs.get_mut(&job_id) {
            log.status = status;
        }
    }

    /// Entries strictly after `since_index`, the next index to request, and
    /// the job's current status. `Error::NotFound` distinguishes an evicted
    /// or unknown job from one that simply has no new entries yet.
    pub fn get_since(
        &self,
        job_id: Uuid,
        since_index: usize,
    ) -> Result<(Vec<LogEntry>, usize, JobStatus)> {
        let inner = self.inner.read().expect("log buffer lock poisoned");
        let log = inner
            .jobs
            .get(&job_id)
            .ok_or_else(|| Error::not_found(format!("job log {job_id}")))?;

        let entries = log.entries.iter().skip(since_index).cloned().collect();
        Ok((entries, log.entries.len(), log.status))
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_since_returns_only_new_entries() {
        let buffer = LogBuffer::new(10);
        let job_id = Uuid::new_v4();
        buffer.start_job(job_id);
        buffer.push(job_id, "info", "probe", "starting", None);
        buffer.push(job_id, "info", "probe", "done", None);

        let (entries, next_index, _) = buffer.get_since(job_id, 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "done");
        assert_eq!(next_index, 2);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let buffer = LogBuffer::new(10);
        let err = buffer.get_since(Uuid::new_v4(), 0).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn eviction_drops_oldest_started_job() {
        let buffer = LogBuffer::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        buffer.start_job(a);
        buffer.start_job(b);
        buffer.start_job(c);

        assert!(buffer.get_since(a, 0).unwrap_err().is_not_found());
        assert!(buffer.get_since(b, 0).is_ok());
        assert!(buffer.get_since(c, 0).is_ok());
    }
}
