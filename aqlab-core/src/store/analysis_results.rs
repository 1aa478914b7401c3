//! Analysis Result CRUD (spec.md §3 "Analysis Result"). Exactly one latest
//! result per track; prior versions are retained for history.

use super::{AnalysisResult, Issue, QualityStatus, Store};
use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Result<AnalysisResult> {
    let id: String = row.get("id");
    let track_id: String = row.get("track_id");
    let issues: String = row.get("issues");
    let stats: String = row.get("stats");
    let created_at: String = row.get("created_at");

    Ok(AnalysisResult {
        id: Uuid::parse_str(&id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        track_id: Uuid::parse_str(&track_id).map_err(|e| Error::ParseFailure(e.to_string()))?,
        schema_version: row.get("schema_version"),
        lossless_score: row.get("lossless_score"),
        status: QualityStatus::parse(row.get("status")),
        integrity_ok: row.get::<i64, _>("integrity_ok") != 0,
        decode_errors: row.get("decode_errors"),
        peak_level_db: row.get("peak_level_db"),
        true_peak_db: row.get("true_peak_db"),
        crest_factor_db: row.get("crest_factor_db"),
        clipped_samples: row.get("clipped_samples"),
        dc_offset: row.get("dc_offset"),
        integrated_loudness_lufs: row.get("integrated_loudness_lufs"),
        loudness_range: row.get("loudness_range"),
        high_frequency_cutoff_hz: row.get("high_frequency_cutoff_hz"),
        spectral_rolloff_hz: row.get("spectral_rolloff_hz"),
        phase_correlation: row.get("phase_correlation"),
        issues: serde_json::from_str(&issues).map_err(|e| Error::ParseFailure(e.to_string()))?,
        stats: serde_json::from_str(&stats).map_err(|e| Error::ParseFailure(e.to_string()))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::ParseFailure(e.to_string()))?,
    })
}

/// The fields an analysis run produces, without the bookkeeping fields
/// (`id`, `created_at`) the Store fills in.
#[derive(Debug, Clone)]
pub struct AnalysisResultFields {
    pub lossless_score: f64,
    pub status: QualityStatus,
    pub integrity_ok: bool,
    pub decode_errors: i64,
    pub peak_level_db: f64,
    pub true_peak_db: f64,
    pub crest_factor_db: f64,
    pub clipped_samples: i64,
    pub dc_offset: f64,
    pub integrated_loudness_lufs: f64,
    pub loudness_range: f64,
    pub high_frequency_cutoff_hz: f64,
    pub spectral_rolloff_hz: f64,
    pub phase_correlation: f64,
    pub issues: Vec<Issue>,
    pub stats: serde_json::Value,
}

impl Store {
    /// Insert a new latest Analysis Result for a track, demoting any
    /// previous latest row (spec.md §3 invariant: exactly one latest per
    /// track, others retained for history).
    pub async fn insert_analysis_result(
        &self,
        track_id: Uuid,
        fields: &AnalysisResultFields,
    ) -> Result<AnalysisResult> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE analysis_results SET is_latest = 0 WHERE track_id = ?")
            .bind(track_id.to_string())
            .execute(&mut *tx)
            .await?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO analysis_results (
                id, track_id, lossless_score, status, integrity_ok, decode_errors,
                peak_level_db, true_peak_db, crest_factor_db, clipped_samples, dc_offset,
                integrated_loudness_lufs, loudness_range, high_frequency_cutoff_hz,
                spectral_rolloff_hz, phase_correlation, issues, stats, is_latest
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(id.to_string())
        .bind(track_id.to_string())
        .bind(fields.lossless_score)
        .bind(fields.status.as_str())
        .bind(fields.integrity_ok as i64)
        .bind(fields.decode_errors)
        .bind(fields.peak_level_db)
        .bind(fields.true_peak_db)
        .bind(fields.crest_factor_db)
        .bind(fields.clipped_samples)
        .bind(fields.dc_offset)
        .bind(fields.integrated_loudness_lufs)
        .bind(fields.loudness_range)
        .bind(fields.high_frequency_cutoff_hz)
        .bind(fields.spectral_rolloff_hz)
        .bind(fields.phase_correlation)
        .bind(serde_json::to_string(&fields.issues).map_err(|e| Error::Internal(e.to_string()))?)
        .bind(fields.stats.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_analysis_result(id).await
    }

    pub async fn get_analysis_result(&self, id: Uuid) -> Result<AnalysisResult> {
        let row = sqlx::query("SELECT * FROM analysis_results WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("analysis result {id}")))?;
        row_to_result(&row)
    }

    pub async fn latest_analysis_result(&self, track_id: Uuid) -> Result<Option<AnalysisResult>> {
        let row = sqlx::query(
            "SELECT * FROM analysis_results WHERE track_id = ? AND is_latest = 1",
        )
        .bind(track_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_result).transpose()
    }

    /// Best-effort update of the latest result's stats map with module
    /// summaries after manifest finalization (spec.md §4.6, non-fatal on
    /// failure — callers should log and continue, not propagate).
    pub async fn merge_analysis_stats(&self, track_id: Uuid, merge: &serde_json::Value) -> Result<()> {
        let Some(existing) = self.latest_analysis_result(track_id).await? else {
            return Ok(());
        };

        let mut stats = existing.stats.clone();
        if let (Some(obj), Some(merge_obj)) = (stats.as_object_mut(), merge.as_object()) {
            for (k, v) in merge_obj {
                obj.insert(k.clone(), v.clone());
            }
        }

        sqlx::query("UPDATE analysis_results SET stats = ? WHERE id = ?")
            .bind(stats.to_string())
            .bind(existing.id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_latest_results_for_tracks(
        &self,
        track_ids: &[Uuid],
    ) -> Result<Vec<AnalysisResult>> {
        let mut out = Vec::with_capacity(track_ids.len());
        for id in track_ids {
            if let Some(result) = self.latest_analysis_result(*id).await? {
                out.push(result);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn seed_track(store: &Store) -> Uuid {
        let lib = store
            .create_library("Main", "/music", "15m", true, None, None)
            .await
            .unwrap();
        let mf = store
            .upsert_new_media_file(lib.id, "/music/a.flac", 1000, Utc::now())
            .await
            .unwrap();
        store
            .upsert_track(
                mf.id,
                &super::super::tracks::TrackFields {
                    duration_secs: 200.0,
                    codec: "flac".into(),
                    sample_rate_hz: 44100,
                    bit_depth: 16,
                    channels: 2,
                    bitrate: None,
                    tags: Default::default(),
                    has_artwork: false,
                },
            )
            .await
            .unwrap()
            .id
    }

    fn sample_fields(score: f64) -> AnalysisResultFields {
        AnalysisResultFields {
            lossless_score: score,
            status: QualityStatus::Pass,
            integrity_ok: true,
            decode_errors: 0,
            peak_level_db: -1.0,
            true_peak_db: -0.5,
            crest_factor_db: 12.0,
            clipped_samples: 0,
            dc_offset: 0.0,
            integrated_loudness_lufs: -14.0,
            loudness_range: 8.0,
            high_frequency_cutoff_hz: 20000.0,
            spectral_rolloff_hz: 19000.0,
            phase_correlation: 0.98,
            issues: vec![],
            stats: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn only_one_latest_per_track() {
        let store = Store::connect_in_memory().await.unwrap();
        let track_id = seed_track(&store).await;

        store
            .insert_analysis_result(track_id, &sample_fields(80.0))
            .await
            .unwrap();
        let second = store
            .insert_analysis_result(track_id, &sample_fields(90.0))
            .await
            .unwrap();

        let latest = store.latest_analysis_result(track_id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.lossless_score, 90.0);

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM analysis_results WHERE track_id = ?")
                .bind(track_id.to_string())
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(count.0, 2, "history is retained, not overwritten");
    }

    #[tokio::test]
    async fn merge_stats_is_noop_when_no_result_exists() {
        let store = Store::connect_in_memory().await.unwrap();
        let track_id = seed_track(&store).await;

        store
            .merge_analysis_stats(track_id, &serde_json::json!({"spectrum": {"ok": true}}))
            .await
            .unwrap();

        assert!(store.latest_analysis_result(track_id).await.unwrap().is_none());
    }
}
