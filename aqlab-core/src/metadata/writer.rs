//! `preview`/`apply` and the atomic write sequence (spec.md §4.7).

use crate::store::{Store, Track, TrackTags};
use aqlab_common::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

/// A tag edit request. Each field is `Option<Option<T>>`: the outer `None`
/// means "not mentioned, leave alone"; `Some(None)` clears the field;
/// `Some(Some(v))` sets it. Mirrors the spec's "fields omitted from the
/// request are not touched" pointer semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WritePreview {
    pub track_id: Uuid,
    pub path: String,
    pub diffs: Vec<FieldDiff>,
    pub can_write: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub track_id: Uuid,
    pub path: String,
    pub success: bool,
    pub diffs: Vec<FieldDiff>,
    pub action_log_id: Option<Uuid>,
    pub error: Option<String>,
}

/// "empty-string is treated as the current value when the DB field is
/// null" (spec.md §4.7): normalize both sides before comparing.
fn norm(v: Option<&str>) -> &str {
    v.unwrap_or("")
}

fn string_diff(field: &str, current: Option<&str>, requested: &Option<Option<String>>, out: &mut Vec<FieldDiff>) {
    let Some(requested) = requested else { return };
    let new = requested.as_deref();
    if norm(current) == norm(new) {
        return;
    }
    out.push(FieldDiff {
        field: field.to_string(),
        before: current.map(str::to_string),
        after: new.map(str::to_string),
    });
}

fn int_diff(field: &str, current: Option<i64>, requested: &Option<Option<i64>>, out: &mut Vec<FieldDiff>) {
    let Some(requested) = requested else { return };
    if current == *requested {
        return;
    }
    out.push(FieldDiff {
        field: field.to_string(),
        before: current.map(|v| v.to_string()),
        after: requested.map(|v| v.to_string()),
    });
}

fn compute_diffs(current: &TrackTags, changes: &TagChanges) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    string_diff("title", current.title.as_deref(), &changes.title, &mut diffs);
    string_diff("artist", current.artist.as_deref(), &changes.artist, &mut diffs);
    string_diff("album", current.album.as_deref(), &changes.album, &mut diffs);
    string_diff(
        "albumArtist",
        current.album_artist.as_deref(),
        &changes.album_artist,
        &mut diffs,
    );
    int_diff("trackNumber", current.track_number, &changes.track_number, &mut diffs);
    int_diff("discNumber", current.disc_number, &changes.disc_number, &mut diffs);
    int_diff("year", current.year, &changes.year, &mut diffs);
    string_diff("genre", current.genre.as_deref(), &changes.genre, &mut diffs);
    diffs
}

fn merge_tags(current: &TrackTags, changes: &TagChanges) -> TrackTags {
    let mut merged = current.clone();
    if let Some(v) = &changes.title {
        merged.title = v.clone();
    }
    if let Some(v) = &changes.artist {
        merged.artist = v.clone();
    }
    if let Some(v) = &changes.album {
        merged.album = v.clone();
    }
    if let Some(v) = &changes.album_artist {
        merged.album_artist = v.clone();
    }
    if let Some(v) = &changes.track_number {
        merged.track_number = *v;
    }
    if let Some(v) = &changes.disc_number {
        merged.disc_number = *v;
    }
    if let Some(v) = &changes.year {
        merged.year = *v;
    }
    if let Some(v) = &changes.genre {
        merged.genre = v.clone();
    }
    merged
}

/// ffmpeg-style `key=value` metadata pairs for the diffed fields only.
/// Cleared fields are sent with an empty value, which ffmpeg's
/// `-metadata` drops the tag for.
fn tag_pairs(diffs: &[FieldDiff], merged: &TrackTags) -> Vec<(String, String)> {
    diffs
        .iter()
        .map(|d| {
            let value = match d.field.as_str() {
                "title" => merged.title.clone(),
                "artist" => merged.artist.clone(),
                "album" => merged.album.clone(),
                "albumArtist" => merged.album_artist.clone(),
                "trackNumber" => merged.track_number.map(|v| v.to_string()),
                "discNumber" => merged.disc_number.map(|v| v.to_string()),
                "year" => merged.year.map(|v| v.to_string()),
                "genre" => merged.genre.clone(),
                other => unreachable!("unsupported diff field: {other}"),
            };
            (d.field.clone(), value.unwrap_or_default())
        })
        .collect()
}

/// Remuxes a file with new tags, grounded on the `probe()` subprocess
/// pattern: blocking `Command` in `spawn_blocking`, non-zero exit and
/// stderr surfaced as [`Error::DecoderFailure`].
#[async_trait]
pub trait MuxRunner: Send + Sync {
    async fn remux_with_tags(&self, input: &Path, output: &Path, tags: &[(String, String)]) -> Result<()>;
}

pub struct ProcessMuxRunner {
    pub muxer_path: String,
}

#[async_trait]
impl MuxRunner for ProcessMuxRunner {
    async fn remux_with_tags(&self, input: &Path, output: &Path, tags: &[(String, String)]) -> Result<()> {
        let muxer = self.muxer_path.clone();
        let input = input.to_path_buf();
        let output = output.to_path_buf();
        let tags = tags.to_vec();

        let result = tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new(&muxer);
            cmd.arg("-y")
                .arg("-i")
                .arg(&input)
                .arg("-map")
                .arg("0")
                .arg("-codec")
                .arg("copy");
            for (key, value) in &tags {
                cmd.arg("-metadata").arg(format!("{key}={value}"));
            }
            cmd.arg(&output).output()
        })
        .await
        .map_err(|e| Error::Internal(format!("mux task join error: {e}")))?
        .map_err(|e| Error::DecoderFailure(format!("failed to launch muxer: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::DecoderFailure(format!(
                "muxer exited with {:?}: {stderr}",
                result.status.code()
            )));
        }
        Ok(())
    }
}

pub struct MetadataWriter {
    store: Store,
    muxer: std::sync::Arc<dyn MuxRunner>,
}

impl MetadataWriter {
    pub fn new(store: Store, muxer: std::sync::Arc<dyn MuxRunner>) -> Self {
        Self { store, muxer }
    }

    pub async fn preview(&self, track_id: Uuid, changes: &TagChanges) -> Result<WritePreview> {
        let track = self.store.get_track(track_id).await?;
        let media_file = self.store.get_media_file(track.media_file_id).await?;
        let diffs = compute_diffs(&track.tags, changes);
        let can_write = tokio::fs::metadata(&media_file.path).await.is_ok();

        Ok(WritePreview {
            track_id,
            path: media_file.path,
            error: if can_write {
                None
            } else {
                Some("source file missing or not accessible".to_string())
            },
            diffs,
            can_write,
        })
    }

    pub async fn apply(&self, track_id: Uuid, changes: &TagChanges, actor: &str) -> Result<WriteResult> {
        let preview = self.preview(track_id, changes).await?;
        if preview.diffs.is_empty() {
            return Ok(WriteResult {
                track_id,
                path: preview.path,
                success: true,
                diffs: Vec::new(),
                action_log_id: None,
                error: None,
            });
        }
        if !preview.can_write {
            return Ok(WriteResult {
                track_id,
                path: preview.path,
                success: false,
                diffs: preview.diffs,
                action_log_id: None,
                error: preview.error,
            });
        }

        let track = self.store.get_track(track_id).await?;
        let merged = merge_tags(&track.tags, changes);
        let path = PathBuf::from(&preview.path);
        let pairs = tag_pairs(&preview.diffs, &merged);

        if let Err(e) = self.write_atomic(&path, &pairs).await {
            return Ok(WriteResult {
                track_id,
                path: preview.path,
                success: false,
                diffs: preview.diffs,
                action_log_id: None,
                error: Some(e.to_string()),
            });
        }

        if let Err(e) = self.store.update_track_tags(track_id, &merged).await {
            tracing::warn!(track_id = %track_id, error = %e, "tag file write succeeded but DB update failed");
        }

        let before = serde_json::to_value(&track.tags).unwrap_or_default();
        let after = serde_json::to_value(&merged).unwrap_or_default();
        let action_log_id = match self
            .store
            .record_action("metadata_write", "track", track_id, actor, &before, &after)
            .await
        {
            Ok(entry) => Some(entry.id),
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "failed to record action log entry");
                None
            }
        };

        Ok(WriteResult {
            track_id,
            path: preview.path,
            success: true,
            diffs: preview.diffs,
            action_log_id,
            error: None,
        })
    }

    /// Steps 1-7 of the write sequence. The original file is untouched
    /// until the replacement mux has been produced and verified.
    async fn write_atomic(&self, path: &Path, tags: &[(String, String)]) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let basename = path
            .file_name()
            .ok_or_else(|| Error::Validation(format!("no file name in path {}", path.display())))?
            .to_string_lossy();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let temp_path = dir.join(format!(".{nanos}.{basename}.aqlab-tmp"));
        let mut backup_os = path.as_os_str().to_os_string();
        backup_os.push(".aqlab-backup");
        let backup_path = PathBuf::from(backup_os);

        if let Err(e) = self.muxer.remux_with_tags(path, &temp_path, tags).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if tokio::fs::metadata(&temp_path).await.is_err() {
            return Err(Error::DecoderFailure(
                "muxer reported success but produced no output file".to_string(),
            ));
        }

        tokio::fs::rename(path, &backup_path).await?;

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::rename(&backup_path, path).await;
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::Io(e));
        }

        let _ = tokio::fs::remove_file(&backup_path).await;
        Ok(())
    }
}
