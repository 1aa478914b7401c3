//! Mono phase skip (spec.md §8 scenario 7): a single-channel track's
//! manifest marks the `phase` module skipped rather than running it.

use aqlab_common::config::AnalysisConfig;
use aqlab_common::Result;
use aqlab_core::analysis::decode::{DecodeOutput, DecodeRunner};
use aqlab_core::analysis::AudioscanExecutor;
use aqlab_core::queue::WorkerPool;
use aqlab_core::store::{JobType, Store, TrackFields};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

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

#[tokio::test]
async fn mono_track_skips_the_phase_module_with_the_documented_reason() {
    let store = Store::connect_in_memory().await.unwrap();
    let lib = store.create_library("Main", "/music", "15m", true, None, None).await.unwrap();
    let input_dir = tempfile::tempdir().unwrap();
    let input_path = input_dir.path().join("mono.wav");
    write_silence_wav(&input_path, 1, 44100, 1.0);

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
                channels: 1,
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

    let id = track.id.to_string();
    let prefix = &id[..2.min(id.len())];
    let manifest_path = artifacts_root
        .path()
        .join("tracks")
        .join(prefix)
        .join(&id)
        .join("analysis_manifest_v1.json");
    let contents = tokio::fs::read_to_string(&manifest_path).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();

    assert_eq!(parsed["modules"]["phase"]["status"], "skipped");
    assert_eq!(
        parsed["modules"]["phase"]["error"]["message"],
        "Mono track - phase analysis not applicable"
    );
}
