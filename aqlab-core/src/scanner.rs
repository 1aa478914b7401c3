//! Incremental filesystem scanner (spec.md §4.2). Reconciles a Library's
//! on-disk tree with the Store's Media File index, grounded on
//! `file_scanner.rs`'s directory-walk shape but reworked around `walkdir`
//! and the spec's change-detection and job-enqueue algorithm rather than
//! magic-byte verification.

use crate::store::{
    JobType, Library, MediaFile, MediaFileStatus, ScanCounters, ScanRun, ScanRunStatus, Store,
    SUPPORTED_EXTENSIONS,
};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub run: ScanRun,
    pub new_job_ids: Vec<Uuid>,
    pub errors: Vec<String>,
}

/// Tracks which libraries currently have a scan in flight. Spec.md §4.2:
/// "a scan must not already be running for the same library (a global
/// `is_running` flag is honored)".
#[derive(Clone, Default)]
pub struct Scanner {
    running: Arc<Mutex<HashSet<Uuid>>>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, library_id: Uuid) -> bool {
        self.running.lock().expect("scanner lock poisoned").contains(&library_id)
    }

    fn try_start(&self, library_id: Uuid) -> bool {
        self.running.lock().expect("scanner lock poisoned").insert(library_id)
    }

    fn finish(&self, library_id: Uuid) {
        self.running.lock().expect("scanner lock poisoned").remove(&library_id);
    }

    pub async fn scan(
        &self,
        store: &Store,
        library_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        if !self.try_start(library_id) {
            return Err(Error::Conflict(format!(
                "scan already running for library {library_id}"
            )));
        }

        let result = self.scan_inner(store, library_id, cancel).await;
        self.finish(library_id);
        result
    }

    async fn scan_inner(
        &self,
        store: &Store,
        library_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let library: Library = store.get_library(library_id).await?;
        let run = store.create_scan_run(library_id).await?;

        let existing: Vec<MediaFile> = store.list_media_files_for_library(library_id).await?;
        let mut by_path: HashMap<String, MediaFile> =
            existing.into_iter().map(|mf| (mf.path.clone(), mf)).collect();

        let mut counters = ScanCounters::default();
        let mut errors: Vec<String> = Vec::new();
        let mut new_job_ids = Vec::new();
        let mut found_ids: Vec<Uuid> = Vec::new();

        let walker = WalkDir::new(&library.root_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !e.file_type().is_dir()
                    || !e
                        .file_name()
                        .to_str()
                        .map(|n| n.starts_with('.'))
                        .unwrap_or(false)
            });

        for entry in walker {
            if cancel.is_cancelled() {
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    counters.files_failed += 1;
                    errors.push(e.to_string());
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                continue;
            }

            let path_str = path.to_string_lossy().to_string();

            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(e) => {
                    counters.files_failed += 1;
                    errors.push(format!("{path_str}: {e}"));
                    continue;
                }
            };
            let size_bytes = metadata.len() as i64;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| DateTime::<Utc>::from(t).with_nanosecond(0))
                .unwrap_or_else(Utc::now);
            // second precision per spec.md §4.2 step 4 "(size, mtime-second-precision)"

            match by_path.remove(&path_str) {
                Some(existing_mf) => {
                    found_ids.push(existing_mf.id);
                    let unchanged =
                        existing_mf.size_bytes == size_bytes && existing_mf.mtime == mtime;
                    if !unchanged {
                        if let Err(e) = store
                            .mark_media_file_changed(existing_mf.id, size_bytes, mtime)
                            .await
                        {
                            errors.push(e.to_string());
                            counters.files_failed += 1;
                            continue;
                        }
                        counters.files_changed += 1;

                        let has_pending = store
                            .has_pending_job_for_target(JobType::Analyze, existing_mf.id)
                            .await
                            .unwrap_or(false);
                        if !has_pending {
                            if let Ok(job) = store
                                .enqueue_job(
                                    JobType::Analyze,
                                    "media_file",
                                    existing_mf.id,
                                    0,
                                    3,
                                    None,
                                    Utc::now(),
                                )
                                .await
                            {
                                new_job_ids.push(job.id);
                            }
                        }
                    }
                }
                None => match store
                    .upsert_new_media_file(library_id, &path_str, size_bytes, mtime)
                    .await
                {
                    Ok(new_mf) => {
                        found_ids.push(new_mf.id);
                        counters.files_new += 1;
                        match store
                            .enqueue_job(
                                JobType::Analyze,
                                "media_file",
                                new_mf.id,
                                0,
                                3,
                                None,
                                Utc::now(),
                            )
                            .await
                        {
                            Ok(job) => new_job_ids.push(job.id),
                            Err(e) => errors.push(e.to_string()),
                        }
                    }
                    Err(e) => {
                        counters.files_failed += 1;
                        errors.push(format!("{path_str}: {e}"));
                    }
                },
            }
        }

        counters.files_found = found_ids.len() as i64;

        let deleted = store
            .mark_media_files_deleted(library_id, &found_ids)
            .await?;
        counters.files_deleted = deleted;

        let status = if errors.is_empty() {
            ScanRunStatus::Success
        } else {
            ScanRunStatus::Failed
        };
        let first_error = errors.first().cloned();

        let finished_run = store
            .finish_scan_run(run.id, &counters, status, first_error.as_deref())
            .await?;

        store
            .set_library_scan_status(library_id, crate::store::LibraryStatus::Success, Utc::now())
            .await?;

        Ok(ScanResult {
            run: finished_run,
            new_job_ids,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn seed_library(store: &Store, root: &Path) -> Uuid {
        store
            .create_library(
                "Main",
                root.to_str().unwrap(),
                "15m",
                true,
                None,
                None,
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn discovers_new_files_and_enqueues_jobs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.flac"), b"fake").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let store = Store::connect_in_memory().await.unwrap();
        let library_id = seed_library(&store, dir.path()).await;

        let scanner = Scanner::new();
        let cancel = CancellationToken::new();
        let result = scanner.scan(&store, library_id, &cancel).await.unwrap();

        assert_eq!(result.run.counters.files_new, 1);
        assert_eq!(result.new_job_ids.len(), 1);

        let jobs = store.list_jobs(Some(crate::store::JobStatus::Queued)).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn second_scan_of_unchanged_tree_enqueues_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.flac"), b"fake").unwrap();

        let store = Store::connect_in_memory().await.unwrap();
        let library_id = seed_library(&store, dir.path()).await;
        let scanner = Scanner::new();
        let cancel = CancellationToken::new();

        scanner.scan(&store, library_id, &cancel).await.unwrap();
        let second = scanner.scan(&store, library_id, &cancel).await.unwrap();

        assert_eq!(second.run.counters.files_new, 0);
        assert_eq!(second.run.counters.files_changed, 0);
        assert!(second.new_job_ids.is_empty());
    }

    #[tokio::test]
    async fn removed_file_marks_media_file_deleted_not_removed() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("a.flac");
        fs::write(&file_path, b"fake").unwrap();

        let store = Store::connect_in_memory().await.unwrap();
        let library_id = seed_library(&store, dir.path()).await;
        let scanner = Scanner::new();
        let cancel = CancellationToken::new();
        scanner.scan(&store, library_id, &cancel).await.unwrap();

        fs::remove_file(&file_path).unwrap();
        let result = scanner.scan(&store, library_id, &cancel).await.unwrap();

        assert_eq!(result.run.counters.files_deleted, 1);
        assert!(result.run.error_message.is_none());
    }

    #[tokio::test]
    async fn concurrent_scan_of_same_library_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.flac"), b"fake").unwrap();

        let store = Store::connect_in_memory().await.unwrap();
        let library_id = seed_library(&store, dir.path()).await;
        let scanner = Scanner::new();

        assert!(scanner.try_start(library_id));
        let cancel = CancellationToken::new();
        let err = scanner.scan(&store, library_id, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        scanner.finish(library_id);
    }
}
