//! Atomic tag edit (spec.md §8 scenario 5): preview reports a diff without
//! touching anything, apply succeeds, no backup file survives, an
//! ActionLog entry records matching before/after state, and the Track
//! row reflects the new title.

use aqlab_core::metadata::{MetadataWriter, MuxRunner, TagChanges};
use aqlab_core::store::{Store, TrackFields, TrackTags};
use aqlab_common::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

struct CopyingMuxer;

#[async_trait]
impl MuxRunner for CopyingMuxer {
    async fn remux_with_tags(&self, input: &Path, output: &Path, _tags: &[(String, String)]) -> Result<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

#[tokio::test]
async fn preview_then_apply_round_trips_a_title_change_atomically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("track.flac");
    tokio::fs::write(&path, b"original audio payload").await.unwrap();

    let store = Store::connect_in_memory().await.unwrap();
    let lib = store
        .create_library("Main", dir.path().to_str().unwrap(), "15m", true, None, None)
        .await
        .unwrap();
    let mf = store
        .upsert_new_media_file(lib.id, path.to_str().unwrap(), 23, chrono::Utc::now())
        .await
        .unwrap();
    let track = store
        .upsert_track(
            mf.id,
            &TrackFields {
                duration_secs: 180.0,
                codec: "flac".into(),
                sample_rate_hz: 44100,
                bit_depth: 16,
                channels: 2,
                bitrate: None,
                tags: TrackTags { title: Some("Old".into()), ..Default::default() },
                has_artwork: false,
            },
        )
        .await
        .unwrap();

    let writer = MetadataWriter::new(store.clone(), Arc::new(CopyingMuxer));
    let changes = TagChanges { title: Some(Some("New".to_string())), ..Default::default() };

    let preview = writer.preview(track.id, &changes).await.unwrap();
    assert!(preview.can_write);
    assert_eq!(preview.diffs.len(), 1);
    assert_eq!(preview.diffs[0].before.as_deref(), Some("Old"));
    assert_eq!(preview.diffs[0].after.as_deref(), Some("New"));

    // Preview must not mutate anything.
    let unchanged = store.get_track(track.id).await.unwrap();
    assert_eq!(unchanged.tags.title.as_deref(), Some("Old"));

    let result = writer.apply(track.id, &changes, "operator").await.unwrap();
    assert!(result.success, "apply failed: {:?}", result.error);

    let backup = path.with_extension("flac.aqlab-backup");
    assert!(!backup.exists(), "no backup should survive a successful apply");
    assert!(path.exists());

    let updated = store.get_track(track.id).await.unwrap();
    assert_eq!(updated.tags.title.as_deref(), Some("New"));

    let log_id = result.action_log_id.expect("a successful apply records an ActionLog entry");
    let logs = store
        .list_action_logs(Some("track"), Some(track.id), 10)
        .await
        .unwrap();
    let entry = logs.into_iter().find(|l| l.id == log_id).unwrap();
    assert_eq!(entry.before_state["title"], serde_json::json!("Old"));
    assert_eq!(entry.after_state["title"], serde_json::json!("New"));
}
