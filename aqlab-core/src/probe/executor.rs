//! `JobExecutor` for `analyze` jobs (spec.md §4.5): probe a Media File,
//! derive and upsert its Track, then enqueue the follow-on `audioscan` job.

use super::{derive_track_fields, probe};
use crate::queue::{JobExecutor, JobLogger};
use crate::store::{Job, JobType, MediaFileStatus, Store};
use aqlab_common::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub struct AnalyzeExecutor {
    store: Store,
    prober_path: String,
}

impl AnalyzeExecutor {
    pub fn new(store: Store, prober_path: String) -> Self {
        Self { store, prober_path }
    }
}

#[async_trait]
impl JobExecutor for AnalyzeExecutor {
    async fn execute(&self, job: &Job, logger: JobLogger, _cancel: &CancellationToken) -> Result<()> {
        let media_file = self.store.get_media_file(job.target_id).await?;

        logger.log("info", "probe", format!("probing {}", media_file.path));
        let probe_result = match probe(&self.prober_path, Path::new(&media_file.path)).await {
            Ok(result) => result,
            Err(e) => {
                logger.log("error", "probe", format!("probe failed: {e}"));
                self.store
                    .set_media_file_status(media_file.id, MediaFileStatus::Failed, Some(&e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        let fields = derive_track_fields(&probe_result);
        let track = self.store.upsert_track(media_file.id, &fields).await?;
        self.store
            .set_media_file_status(media_file.id, MediaFileStatus::Success, None)
            .await?;

        let has_pending = self
            .store
            .has_pending_job_for_target(JobType::Audioscan, track.id)
            .await
            .unwrap_or(false);
        if !has_pending {
            self.store
                .enqueue_job(JobType::Audioscan, "track", track.id, 0, 5, None, Utc::now())
                .await?;
            logger.log("info", "probe", "enqueued audioscan job");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::LogBuffer;
    use crate::store::JobType;

    fn make_logger(buffer: &LogBuffer, job_id: uuid::Uuid) -> JobLogger {
        buffer.start_job(job_id);
        crate::queue::JobLogger::for_test(buffer.clone(), job_id)
    }

    #[tokio::test]
    async fn failed_probe_marks_media_file_failed_and_propagates_error() {
        let store = Store::connect_in_memory().await.unwrap();
        let lib = store.create_library("Main", "/music", "15m", true, None, None).await.unwrap();
        let mf = store
            .upsert_new_media_file(lib.id, "/does/not/exist.flac", 100, Utc::now())
            .await
            .unwrap();

        let executor = AnalyzeExecutor::new(store.clone(), "/nonexistent-prober-binary".into());
        let job = store
            .enqueue_job(JobType::Analyze, "media_file", mf.id, 0, 3, None, Utc::now())
            .await
            .unwrap();

        let buffer = LogBuffer::default();
        let logger = make_logger(&buffer, job.id);
        let cancel = CancellationToken::new();
        let result = executor.execute(&job, logger, &cancel).await;
        assert!(result.is_err());

        let refreshed = store.get_media_file(mf.id).await.unwrap();
        assert_eq!(refreshed.status, MediaFileStatus::Failed);
    }
}
