//! Analysis pipeline (spec.md §4.6). Five modules sharing a decode-driver
//! and a manifest; a skipped or failed module never aborts the others.

pub mod clipping;
pub mod decode;
pub mod dynamics;
pub mod loudness;
pub mod manifest;
pub mod phase;
pub mod spectrum;

use crate::queue::{JobExecutor, JobLogger};
use crate::store::{Job, JobType, Store, Track};
use aqlab_common::config::AnalysisConfig;
use aqlab_common::{Error, Result};
use decode::DecodeRunner;
use manifest::{AnalysisManifest, ArtifactRef, ProbeCacheSnapshot};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tiny logging capability bound to a job (spec.md §9 "job-logger
/// injection"); a no-op implementation backs direct test harnesses, the
/// worker pool's [`JobLogger`] backs production runs.
pub trait JobLog: Send + Sync {
    fn info(&self, module: &str, message: &str);
    fn debug(&self, module: &str, message: &str);
    fn warn(&self, module: &str, message: &str);
    fn error(&self, module: &str, message: &str);
}

#[derive(Default)]
pub struct NoopJobLog;

impl JobLog for NoopJobLog {
    fn info(&self, _module: &str, _message: &str) {}
    fn debug(&self, _module: &str, _message: &str) {}
    fn warn(&self, _module: &str, _message: &str) {}
    fn error(&self, _module: &str, _message: &str) {}
}

impl JobLog for JobLogger {
    fn info(&self, module: &str, message: &str) {
        self.log("info", module, message);
    }
    fn debug(&self, module: &str, message: &str) {
        self.log("debug", module, message);
    }
    fn warn(&self, module: &str, message: &str) {
        self.log("warn", module, message);
    }
    fn error(&self, module: &str, message: &str) {
        self.log("error", module, message);
    }
}

/// Everything a single module invocation needs: the decoded track, where
/// to write artifacts, and the capabilities (decode, logging) it must go
/// through rather than touch directly.
pub struct ModuleContext<'a> {
    pub track: &'a Track,
    pub media_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub probe_cache: &'a ProbeCacheSnapshot,
    pub duration_secs: f64,
    pub decoder: &'a dyn DecodeRunner,
    pub logger: &'a dyn JobLog,
    pub cancel: &'a CancellationToken,
}

/// MessagePack-serialize, Zstd-compress, write to
/// `<dir>/<kind>_<noun>_v1.msgpack.zst`, hash the written bytes, and build
/// the manifest's artifact reference (spec.md §4.6 module contract steps
/// 5-6). Every module's artifact is a `_series_v1`, except spectrum's,
/// which spec.md §6 names `audioscan_curve_v1.msgpack.zst`.
pub async fn write_series_artifact<T: serde::Serialize>(
    dir: &std::path::Path,
    kind: &str,
    series: &T,
) -> Result<ArtifactRef> {
    let packed =
        rmp_serde::to_vec_named(series).map_err(|e| Error::Internal(format!("msgpack encode: {e}")))?;
    let compressed =
        zstd::encode_all(packed.as_slice(), 0).map_err(|e| Error::Internal(format!("zstd encode: {e}")))?;

    let noun = if kind == "audioscan" { "curve" } else { "series" };
    let filename = format!("{kind}_{noun}_v1.msgpack.zst");
    let path = dir.join(&filename);
    tokio::fs::write(&path, &compressed).await?;

    let mut hasher = Sha256::new();
    hasher.update(&compressed);
    let sha256 = format!("{:x}", hasher.finalize());

    Ok(ArtifactRef {
        path: filename,
        sha256,
        content_type: "application/x-msgpack+zstd".to_string(),
    })
}

/// `JobExecutor` for `audioscan` jobs (spec.md §4.6). Runs the shared
/// preamble, then each module in sequence, then finalizes the manifest.
pub struct AudioscanExecutor {
    store: Store,
    decoder: Arc<dyn DecodeRunner>,
    artifacts_root: PathBuf,
    config: AnalysisConfig,
}

impl AudioscanExecutor {
    pub fn new(
        store: Store,
        decoder: Arc<dyn DecodeRunner>,
        artifacts_root: PathBuf,
        config: AnalysisConfig,
    ) -> Self {
        Self { store, decoder, artifacts_root, config }
    }
}

fn artifact_dir_for(root: &std::path::Path, track_id: uuid::Uuid) -> PathBuf {
    let id = track_id.to_string();
    let prefix = &id[..2.min(id.len())];
    root.join("tracks").join(prefix).join(&id)
}

#[async_trait::async_trait]
impl JobExecutor for AudioscanExecutor {
    async fn execute(&self, job: &Job, logger: JobLogger, cancel: &CancellationToken) -> Result<()> {
        let track = self.store.get_track(job.target_id).await?;
        let media_file = self.store.get_media_file(track.media_file_id).await?;

        let artifact_dir = artifact_dir_for(&self.artifacts_root, track.id);
        tokio::fs::create_dir_all(&artifact_dir).await?;

        let probe_cache = ProbeCacheSnapshot {
            source: "probe".to_string(),
            sample_rate_hz: track.sample_rate_hz,
            bit_depth: if track.bit_depth > 0 { Some(track.bit_depth) } else { None },
            channels: track.channels,
            codec: track.codec.clone(),
            container: media_file
                .path
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_lowercase(),
            duration_sec: track.duration_secs,
        };

        let max_duration = if self.config.max_duration_secs == 0 {
            track.duration_secs
        } else {
            track.duration_secs.min(self.config.max_duration_secs as f64)
        };

        let ctx_probe_cache = probe_cache.clone();
        let mut manifest = AnalysisManifest::new(track.id, probe_cache);

        let ctx = ModuleContext {
            track: &track,
            media_path: PathBuf::from(&media_file.path),
            artifact_dir: artifact_dir.clone(),
            probe_cache: &ctx_probe_cache,
            duration_secs: max_duration,
            decoder: self.decoder.as_ref(),
            logger: &logger,
            cancel,
        };

        logger.log("info", "audioscan", "starting spectrum analysis");
        manifest.set_module("audioscan", spectrum::run(&ctx).await);

        logger.log("info", "audioscan", "starting loudness analysis");
        manifest.set_module("loudness", loudness::run(&ctx).await);

        logger.log("info", "audioscan", "starting clipping analysis");
        manifest.set_module("clipping", clipping::run(&ctx).await);

        logger.log("info", "audioscan", "starting phase analysis");
        manifest.set_module("phase", phase::run(&ctx).await);

        logger.log("info", "audioscan", "starting dynamics analysis");
        manifest.set_module("dynamics", dynamics::run(&ctx).await);

        manifest.write_atomic(&artifact_dir).await?;

        let mut merge = serde_json::Map::new();
        for (name, entry) in &manifest.modules {
            if let Some(summary) = &entry.summary {
                merge.insert(name.clone(), summary.clone());
            }
        }
        if let Err(e) = self
            .store
            .merge_analysis_stats(track.id, &serde_json::Value::Object(merge))
            .await
        {
            logger.log("warn", "audioscan", format!("stats merge failed: {e}"));
        }

        logger.log("info", "audioscan", "manifest written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decode::DecodeOutput;
    use crate::queue::WorkerPool;
    use crate::store::TrackFields;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SilentDecoder;

    #[async_trait]
    impl DecodeRunner for SilentDecoder {
        async fn run(&self, _path: &std::path::Path, _args: &[String]) -> Result<DecodeOutput> {
            Ok(DecodeOutput { stdout: vec![], stderr: String::new() })
        }
    }

    fn write_silence_wav(path: &std::path::Path, channels: u16, sample_rate: u32, seconds: f64) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total_samples = (sample_rate as f64 * seconds) as usize * channels as usize;
        for _ in 0..total_samples {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Drives `AudioscanExecutor` through the real worker pool so the test
    /// exercises the same `JobLogger` construction path production code
    /// uses, rather than reaching into its private fields.
    #[tokio::test]
    async fn audioscan_writes_manifest_for_every_module() {
        let store = Store::connect_in_memory().await.unwrap();
        let lib = store.create_library("Main", "/music", "15m", true, None, None).await.unwrap();
        let input_dir = tempfile::tempdir().unwrap();
        let input_path = input_dir.path().join("a.wav");
        write_silence_wav(&input_path, 2, 44100, 1.0);

        let mf = store
            .upsert_new_media_file(lib.id, input_path.to_str().unwrap(), 1000, chrono::Utc::now())
            .await
            .unwrap();
        let track = store
            .upsert_track(
                mf.id,
                &TrackFields {
                    duration_secs: 1.0,
                    codec: "pcm_s16le".into(),
                    sample_rate_hz: 44100,
                    bit_depth: 16,
                    channels: 2,
                    bitrate: None,
                    tags: Default::default(),
                    has_artwork: false,
                },
            )
            .await
            .unwrap();

        let artifacts_root = tempfile::tempdir().unwrap();
        let executor = Arc::new(AudioscanExecutor::new(
            store.clone(),
            Arc::new(SilentDecoder),
            artifacts_root.path().to_path_buf(),
            AnalysisConfig::default(),
        ));

        store
            .enqueue_job(JobType::Audioscan, "track", track.id, 0, 3, None, chrono::Utc::now())
            .await
            .unwrap();

        let mut pool = WorkerPool::new(store.clone(), 1, Duration::from_millis(10));
        pool.register_executor(JobType::Audioscan, executor);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel_clone.cancel();
        });
        pool.run(cancel).await;

        let dir = artifact_dir_for(artifacts_root.path(), track.id);
        let manifest_path = dir.join("analysis_manifest_v1.json");
        assert!(manifest_path.exists());

        let contents = tokio::fs::read_to_string(&manifest_path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        for name in ["audioscan", "loudness", "clipping", "phase", "dynamics"] {
            assert!(parsed["modules"][name].is_object(), "missing module {name}");
        }

        let jobs = store.list_jobs(Some(crate::store::JobStatus::Success)).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
