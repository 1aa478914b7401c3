//! Album consistency view (spec.md §4.1 `list_albums`/`album_detail`, §4.8).
//! A read model assembled on demand from tracks + their latest Analysis
//! Result; nothing here is persisted.

use super::{AnalysisResult, QualityStatus, Store, Track};
use aqlab_common::Result;
use serde::Serialize;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct AlbumSummary {
    pub album: String,
    pub album_artist: Option<String>,
    pub track_count: i64,
    pub dominant_codec: String,
    pub avg_dr: Option<f64>,
    pub suspect_count: i64,
    pub version_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumTrackView {
    pub track: Track,
    pub dr_score: Option<i64>,
    pub outlier_codec: bool,
    pub outlier_sample_rate: bool,
    pub outlier_bit_depth: bool,
    pub outlier_dr: bool,
    pub outlier_loudness: bool,
    pub suspect: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumDetail {
    pub album: String,
    pub album_artist: Option<String>,
    pub dominant_codec: String,
    pub dominant_sample_rate_hz: i64,
    pub dominant_bit_depth: i64,
    pub avg_dr: Option<f64>,
    pub avg_loudness: Option<f64>,
    pub tracks: Vec<AlbumTrackView>,
    pub is_consistent: bool,
}

/// Per-track DR score, spec.md §4.8: `clamp(round(loudnessRange + crestFactor/2), 1, 20)`.
fn dr_score(result: &AnalysisResult) -> i64 {
    let raw = (result.loudness_range + result.crest_factor_db / 2.0).round() as i64;
    raw.clamp(1, 20)
}

/// Mode (most frequent value) of an iterator of comparable keys. Ties break
/// on first-seen order, which is deterministic given a stable input order.
fn mode<T: Clone + Eq + std::hash::Hash>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, i64> = HashMap::new();
    let mut order: Vec<T> = Vec::new();
    for v in values {
        if !counts.contains_key(&v) {
            order.push(v.clone());
        }
        *counts.entry(v).or_insert(0) += 1;
    }
    order
        .into_iter()
        .max_by_key(|v| counts[v])
}

impl Store {
    pub async fn list_albums(&self, limit: i64, offset: i64) -> Result<Vec<AlbumSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT album, album_artist FROM tracks
            WHERE album IS NOT NULL
            ORDER BY album_artist, album
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let album: String = row.get("album");
            let album_artist: Option<String> = row.get("album_artist");
            let detail = self.album_detail(&album, album_artist.as_deref()).await?;

            let suspect_count = detail.tracks.iter().filter(|t| t.suspect).count() as i64;
            let version_count = {
                let mut codecs: Vec<&str> = detail
                    .tracks
                    .iter()
                    .map(|t| t.track.codec.as_str())
                    .collect();
                codecs.sort_unstable();
                codecs.dedup();
                codecs.len() as i64
            };

            out.push(AlbumSummary {
                album: detail.album.clone(),
                album_artist: detail.album_artist.clone(),
                track_count: detail.tracks.len() as i64,
                dominant_codec: detail.dominant_codec.clone(),
                avg_dr: detail.avg_dr,
                suspect_count,
                version_count,
            });
        }

        Ok(out)
    }

    pub async fn album_detail(&self, album: &str, album_artist: Option<&str>) -> Result<AlbumDetail> {
        let track_rows = match album_artist {
            Some(artist) => {
                sqlx::query("SELECT * FROM tracks WHERE album = ? AND album_artist = ?")
                    .bind(album)
                    .bind(artist)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM tracks WHERE album = ?")
                    .bind(album)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut tracks = Vec::with_capacity(track_rows.len());
        for row in &track_rows {
            tracks.push(super::tracks::row_to_track(row)?);
        }

        let mut results: HashMap<Uuid, AnalysisResult> = HashMap::new();
        for track in &tracks {
            if let Some(result) = self.latest_analysis_result(track.id).await? {
                results.insert(track.id, result);
            }
        }

        let dominant_codec = mode(tracks.iter().map(|t| t.codec.clone())).unwrap_or_default();
        let dominant_sample_rate_hz = mode(tracks.iter().map(|t| t.sample_rate_hz)).unwrap_or(0);
        let dominant_bit_depth = mode(tracks.iter().map(|t| t.bit_depth)).unwrap_or(0);

        let dr_scores: Vec<i64> = tracks
            .iter()
            .filter_map(|t| results.get(&t.id))
            .filter(|r| r.loudness_range > 0.0)
            .map(dr_score)
            .collect();
        let avg_dr = if dr_scores.is_empty() {
            None
        } else {
            Some(dr_scores.iter().sum::<i64>() as f64 / dr_scores.len() as f64)
        };

        let loudness_values: Vec<f64> = tracks
            .iter()
            .filter_map(|t| results.get(&t.id))
            .map(|r| r.integrated_loudness_lufs)
            .filter(|l| *l != 0.0)
            .collect();
        let avg_loudness = if loudness_values.is_empty() {
            None
        } else {
            Some(loudness_values.iter().sum::<f64>() / loudness_values.len() as f64)
        };

        let mut codec_varieties: Vec<String> = tracks.iter().map(|t| t.codec.clone()).collect();
        codec_varieties.sort_unstable();
        codec_varieties.dedup();
        let mut sample_rate_varieties: Vec<i64> = tracks.iter().map(|t| t.sample_rate_hz).collect();
        sample_rate_varieties.sort_unstable();
        sample_rate_varieties.dedup();
        let mut bit_depth_varieties: Vec<i64> = tracks.iter().map(|t| t.bit_depth).collect();
        bit_depth_varieties.sort_unstable();
        bit_depth_varieties.dedup();

        let mut track_views = Vec::with_capacity(tracks.len());
        let mut any_suspect = false;
        for track in tracks {
            let result = results.get(&track.id);
            let score = result.map(dr_score);

            let outlier_dr = match (score, avg_dr) {
                (Some(score), Some(avg)) => (score as f64 - avg).abs() > 4.0,
                _ => false,
            };
            let outlier_loudness = match (result, avg_loudness) {
                (Some(r), Some(avg)) if r.integrated_loudness_lufs != 0.0 => {
                    (r.integrated_loudness_lufs - avg).abs() > 3.0
                }
                _ => false,
            };
            let suspect = matches!(
                result.map(|r| r.status),
                Some(QualityStatus::Warn) | Some(QualityStatus::Fail)
            );
            any_suspect |= suspect;

            track_views.push(AlbumTrackView {
                outlier_codec: track.codec != dominant_codec,
                outlier_sample_rate: track.sample_rate_hz != dominant_sample_rate_hz,
                outlier_bit_depth: track.bit_depth != dominant_bit_depth,
                outlier_dr,
                outlier_loudness,
                suspect,
                dr_score: score,
                track,
            });
        }

        let is_consistent = codec_varieties.len() == 1
            && sample_rate_varieties.len() == 1
            && bit_depth_varieties.len() == 1
            && !any_suspect;

        Ok(AlbumDetail {
            album: album.to_string(),
            album_artist: album_artist.map(|s| s.to_string()),
            dominant_codec,
            dominant_sample_rate_hz,
            dominant_bit_depth,
            avg_dr,
            avg_loudness,
            tracks: track_views,
            is_consistent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::analysis_results::AnalysisResultFields;
    use crate::store::tracks::TrackFields;
    use crate::store::QualityStatus;
    use chrono::Utc;

    async fn seed_track(
        store: &Store,
        path: &str,
        album: &str,
        codec: &str,
        sample_rate: i64,
        bit_depth: i64,
    ) -> Uuid {
        let lib = store
            .get_or_create_test_library()
            .await;
        let mf = store
            .upsert_new_media_file(lib, path, 1000, Utc::now())
            .await
            .unwrap();
        let track = store
            .upsert_track(
                mf.id,
                &TrackFields {
                    duration_secs: 200.0,
                    codec: codec.into(),
                    sample_rate_hz: sample_rate,
                    bit_depth,
                    channels: 2,
                    bitrate: None,
                    tags: crate::store::TrackTags {
                        album: Some(album.into()),
                        album_artist: Some("Artist".into()),
                        ..Default::default()
                    },
                    has_artwork: false,
                },
            )
            .await
            .unwrap();
        track.id
    }

    impl Store {
        async fn get_or_create_test_library(&self) -> Uuid {
            if let Ok(libs) = self.list_libraries(&Default::default()).await {
                if let Some(lib) = libs.into_iter().next() {
                    return lib.id;
                }
            }
            self.create_library("Main", "/music", "15m", true, None, None)
                .await
                .unwrap()
                .id
        }
    }

    fn fields(loudness_range: f64, crest_factor_db: f64, status: QualityStatus) -> AnalysisResultFields {
        AnalysisResultFields {
            lossless_score: 90.0,
            status,
            integrity_ok: true,
            decode_errors: 0,
            peak_level_db: -1.0,
            true_peak_db: -0.5,
            crest_factor_db,
            clipped_samples: 0,
            dc_offset: 0.0,
            integrated_loudness_lufs: -14.0,
            loudness_range,
            high_frequency_cutoff_hz: 20000.0,
            spectral_rolloff_hz: 19000.0,
            phase_correlation: 0.98,
            issues: vec![],
            stats: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn consistent_album_has_single_varieties_and_no_suspects() {
        let store = Store::connect_in_memory().await.unwrap();
        let t1 = seed_track(&store, "/music/1.flac", "Album", "flac", 44100, 16).await;
        let t2 = seed_track(&store, "/music/2.flac", "Album", "flac", 44100, 16).await;
        store
            .insert_analysis_result(t1, &fields(8.0, 12.0, QualityStatus::Pass))
            .await
            .unwrap();
        store
            .insert_analysis_result(t2, &fields(9.0, 13.0, QualityStatus::Pass))
            .await
            .unwrap();

        let detail = store.album_detail("Album", Some("Artist")).await.unwrap();
        assert!(detail.is_consistent);
        assert_eq!(detail.dominant_codec, "flac");
    }

    #[tokio::test]
    async fn mismatched_codec_flags_outlier_and_inconsistency() {
        let store = Store::connect_in_memory().await.unwrap();
        let t1 = seed_track(&store, "/music/1.flac", "Album", "flac", 44100, 16).await;
        let t2 = seed_track(&store, "/music/2.mp3", "Album", "mp3", 44100, 0).await;
        store
            .insert_analysis_result(t1, &fields(8.0, 12.0, QualityStatus::Pass))
            .await
            .unwrap();
        store
            .insert_analysis_result(t2, &fields(8.0, 12.0, QualityStatus::Pass))
            .await
            .unwrap();

        let detail = store.album_detail("Album", Some("Artist")).await.unwrap();
        assert!(!detail.is_consistent);
        let mp3_track = detail.tracks.iter().find(|t| t.track.codec == "mp3").unwrap();
        assert!(mp3_track.outlier_codec);
        assert!(mp3_track.outlier_bit_depth);
    }

    #[tokio::test]
    async fn suspect_status_makes_album_inconsistent() {
        let store = Store::connect_in_memory().await.unwrap();
        let t1 = seed_track(&store, "/music/1.flac", "Album", "flac", 44100, 16).await;
        store
            .insert_analysis_result(t1, &fields(8.0, 12.0, QualityStatus::Fail))
            .await
            .unwrap();

        let detail = store.album_detail("Album", Some("Artist")).await.unwrap();
        assert!(!detail.is_consistent);
        assert!(detail.tracks[0].suspect);
    }
}
