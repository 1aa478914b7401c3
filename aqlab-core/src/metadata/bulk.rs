//! Bulk tag operations (spec.md §4.7). Each is a loop over `apply`, so
//! every affected track gets its own Action Log entry.

use super::writer::{MetadataWriter, TagChanges, WriteResult};
use crate::store::Store;
use aqlab_common::{Error, Result};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub results: Vec<WriteResult>,
}

impl BulkOutcome {
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Sets `albumArtist` on every track of `album`, optionally filtered to
/// tracks whose current `artist` tag matches `artist`.
pub async fn normalize_album_artist(
    writer: &MetadataWriter,
    store: &Store,
    album: &str,
    artist: Option<&str>,
    album_artist: &str,
    actor: &str,
) -> Result<BulkOutcome> {
    let detail = store.album_detail(album, None).await?;
    let changes = TagChanges {
        album_artist: Some(Some(album_artist.to_string())),
        ..Default::default()
    };

    let mut results = Vec::new();
    for view in detail.tracks {
        if artist.is_some_and(|a| view.track.tags.artist.as_deref() != Some(a)) {
            continue;
        }
        results.push(writer.apply(view.track.id, &changes, actor).await?);
    }
    Ok(BulkOutcome { results })
}

/// Renumbers every matching track sequentially in (disc, track, title)
/// order, starting at 1.
pub async fn fix_track_numbering(
    writer: &MetadataWriter,
    store: &Store,
    album: &str,
    artist: Option<&str>,
    actor: &str,
) -> Result<BulkOutcome> {
    let detail = store.album_detail(album, None).await?;
    let mut tracks: Vec<_> = detail
        .tracks
        .into_iter()
        .filter(|v| match artist {
            Some(a) => v.track.tags.artist.as_deref() == Some(a),
            None => true,
        })
        .map(|v| v.track)
        .collect();

    tracks.sort_by(|a, b| {
        a.tags
            .disc_number
            .unwrap_or(0)
            .cmp(&b.tags.disc_number.unwrap_or(0))
            .then(
                a.tags
                    .track_number
                    .unwrap_or(i64::MAX)
                    .cmp(&b.tags.track_number.unwrap_or(i64::MAX)),
            )
            .then(a.tags.title.as_deref().unwrap_or("").cmp(b.tags.title.as_deref().unwrap_or("")))
    });

    let mut results = Vec::with_capacity(tracks.len());
    for (idx, track) in tracks.into_iter().enumerate() {
        let changes = TagChanges {
            track_number: Some(Some(idx as i64 + 1)),
            ..Default::default()
        };
        results.push(writer.apply(track.id, &changes, actor).await?);
    }
    Ok(BulkOutcome { results })
}

/// Straight assignment of one field across a track selection. Rejects
/// field names outside the supported tag set (spec.md §4.7 "Supported
/// fields") as a validation error rather than silently ignoring them.
pub async fn set_field(
    writer: &MetadataWriter,
    track_ids: &[Uuid],
    field: &str,
    value: Option<&str>,
    actor: &str,
) -> Result<BulkOutcome> {
    let changes = build_field_change(field, value)?;
    let mut results = Vec::with_capacity(track_ids.len());
    for &track_id in track_ids {
        results.push(writer.apply(track_id, &changes, actor).await?);
    }
    Ok(BulkOutcome { results })
}

fn parse_opt_i64(value: Option<&str>) -> Result<Option<i64>> {
    value
        .map(|v| {
            v.parse::<i64>()
                .map_err(|e| Error::Validation(format!("invalid integer value {v:?}: {e}")))
        })
        .transpose()
}

fn build_field_change(field: &str, value: Option<&str>) -> Result<TagChanges> {
    let mut changes = TagChanges::default();
    match field {
        "title" => changes.title = Some(value.map(str::to_string)),
        "artist" => changes.artist = Some(value.map(str::to_string)),
        "album" => changes.album = Some(value.map(str::to_string)),
        "albumArtist" => changes.album_artist = Some(value.map(str::to_string)),
        "genre" => changes.genre = Some(value.map(str::to_string)),
        "trackNumber" => changes.track_number = Some(parse_opt_i64(value)?),
        "discNumber" => changes.disc_number = Some(parse_opt_i64(value)?),
        "year" => changes.year = Some(parse_opt_i64(value)?),
        other => return Err(Error::Validation(format!("unrecognized field: {other}"))),
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::writer::MuxRunner;
    use crate::store::tracks::TrackFields;
    use crate::store::TrackTags;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct AlwaysSucceeds;

    #[async_trait]
    impl MuxRunner for AlwaysSucceeds {
        async fn remux_with_tags(&self, _input: &Path, output: &Path, _tags: &[(String, String)]) -> Result<()> {
            tokio::fs::write(output, b"remuxed").await?;
            Ok(())
        }
    }

    async fn seed(store: &Store, dir: &Path, name: &str, tags: TrackTags) -> Uuid {
        let path = dir.join(name);
        tokio::fs::write(&path, b"orig").await.unwrap();
        let lib = store.list_libraries(&Default::default()).await.unwrap();
        let lib_id = if let Some(l) = lib.into_iter().next() {
            l.id
        } else {
            store
                .create_library("Main", dir.to_str().unwrap(), "15m", true, None, None)
                .await
                .unwrap()
                .id
        };
        let mf = store
            .upsert_new_media_file(lib_id, path.to_str().unwrap(), 4, Utc::now())
            .await
            .unwrap();
        let track = store
            .upsert_track(
                mf.id,
                &TrackFields {
                    duration_secs: 10.0,
                    codec: "flac".into(),
                    sample_rate_hz: 44100,
                    bit_depth: 16,
                    channels: 2,
                    bitrate: None,
                    tags,
                    has_artwork: false,
                },
            )
            .await
            .unwrap();
        track.id
    }

    #[tokio::test]
    async fn set_field_rejects_unrecognized_field_name() {
        let store = Store::connect_in_memory().await.unwrap();
        let writer = MetadataWriter::new(store, Arc::new(AlwaysSucceeds));
        let err = set_field(&writer, &[Uuid::new_v4()], "bogus", Some("x"), "operator")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn fix_track_numbering_renumbers_in_disc_track_title_order() {
        let dir = tempdir().unwrap();
        let store = Store::connect_in_memory().await.unwrap();
        let t_b = seed(
            &store,
            dir.path(),
            "b.flac",
            TrackTags {
                album: Some("Album".into()),
                title: Some("Beta".into()),
                disc_number: Some(1),
                track_number: Some(9),
                ..Default::default()
            },
        )
        .await;
        let t_a = seed(
            &store,
            dir.path(),
            "a.flac",
            TrackTags {
                album: Some("Album".into()),
                title: Some("Alpha".into()),
                disc_number: Some(1),
                track_number: Some(2),
                ..Default::default()
            },
        )
        .await;

        let writer = MetadataWriter::new(store.clone(), Arc::new(AlwaysSucceeds));
        let outcome = fix_track_numbering(&writer, &store, "Album", None, "operator")
            .await
            .unwrap();
        assert_eq!(outcome.failure_count(), 0);

        let alpha = store.get_track(t_a).await.unwrap();
        let beta = store.get_track(t_b).await.unwrap();
        assert_eq!(alpha.tags.track_number, Some(1));
        assert_eq!(beta.tags.track_number, Some(2));
    }

    #[tokio::test]
    async fn normalize_album_artist_filters_by_current_artist() {
        let dir = tempdir().unwrap();
        let store = Store::connect_in_memory().await.unwrap();
        let keep = seed(
            &store,
            dir.path(),
            "keep.flac",
            TrackTags {
                album: Some("Album".into()),
                artist: Some("Featured".into()),
                ..Default::default()
            },
        )
        .await;
        let skip = seed(
            &store,
            dir.path(),
            "skip.flac",
            TrackTags {
                album: Some("Album".into()),
                artist: Some("Other".into()),
                ..Default::default()
            },
        )
        .await;

        let writer = MetadataWriter::new(store.clone(), Arc::new(AlwaysSucceeds));
        normalize_album_artist(&writer, &store, "Album", Some("Featured"), "Various Artists", "operator")
            .await
            .unwrap();

        assert_eq!(
            store.get_track(keep).await.unwrap().tags.album_artist.as_deref(),
            Some("Various Artists")
        );
        assert_eq!(store.get_track(skip).await.unwrap().tags.album_artist, None);
    }
}
