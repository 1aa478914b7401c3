//! Analysis Manifest (spec.md §3 "Analysis Manifest", §6 manifest JSON
//! schema v1). Always written last, after every referenced artifact is
//! fully fsync'd with a matching SHA-256 — the source of truth for one
//! analysis run; the `AnalysisResult` row is a denormalized convenience.

use aqlab_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeCacheSnapshot {
    pub source: String,
    pub sample_rate_hz: i64,
    pub bit_depth: Option<i64>,
    pub channels: i64,
    pub codec: String,
    pub container: String,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub sha256: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleError {
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub status: ModuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "renderHints")]
    pub render_hints: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ModuleError>,
}

impl ModuleEntry {
    pub fn ok(summary: serde_json::Value, raw: ArtifactRef, render_hints: serde_json::Value) -> Self {
        Self {
            status: ModuleStatus::Ok,
            summary: Some(summary),
            raw: Some(raw),
            render_hints: Some(render_hints),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            status: ModuleStatus::Error,
            summary: None,
            raw: None,
            render_hints: None,
            error: Some(ModuleError { message: message.into(), detail }),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: ModuleStatus::Skipped,
            summary: None,
            raw: None,
            render_hints: None,
            error: Some(ModuleError { message: reason.into(), detail: None }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisManifest {
    pub version: i64,
    #[serde(rename = "trackId")]
    pub track_id: uuid::Uuid,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "probeCache")]
    pub probe_cache: ProbeCacheSnapshot,
    pub modules: BTreeMap<String, ModuleEntry>,
}

impl AnalysisManifest {
    pub fn new(track_id: uuid::Uuid, probe_cache: ProbeCacheSnapshot) -> Self {
        Self {
            version: MANIFEST_VERSION,
            track_id,
            generated_at: Utc::now(),
            probe_cache,
            modules: BTreeMap::new(),
        }
    }

    pub fn set_module(&mut self, name: &str, entry: ModuleEntry) {
        self.modules.insert(name.to_string(), entry);
    }

    /// Write to `<dir>/analysis_manifest_v1.json`, atomically (temp file +
    /// rename), once every referenced artifact already exists on disk.
    pub async fn write_atomic(&self, dir: &Path) -> Result<()> {
        let final_path = dir.join("analysis_manifest_v1.json");
        let temp_path = dir.join(format!(".analysis_manifest_v1.{}.tmp", Utc::now().timestamp_nanos_opt().unwrap_or_default()));

        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Internal(format!("serializing manifest: {e}")))?;

        tokio::fs::write(&temp_path, &body).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cache() -> ProbeCacheSnapshot {
        ProbeCacheSnapshot {
            source: "probe".into(),
            sample_rate_hz: 44100,
            bit_depth: Some(16),
            channels: 2,
            codec: "flac".into(),
            container: "flac".into(),
            duration_sec: 245.3,
        }
    }

    #[tokio::test]
    async fn writes_atomically_and_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = AnalysisManifest::new(uuid::Uuid::new_v4(), sample_cache());
        manifest.set_module(
            "dynamics",
            ModuleEntry::ok(
                serde_json::json!({"avgCrestDb": 14.0}),
                ArtifactRef {
                    path: "dynamics_series_v1.msgpack.zst".into(),
                    sha256: "abc".into(),
                    content_type: "application/x-msgpack+zstd".into(),
                },
                serde_json::json!({"yMin": 0, "yMax": 25}),
            ),
        );
        manifest.set_module("phase", ModuleEntry::skipped("Mono track - phase analysis not applicable"));

        manifest.write_atomic(dir.path()).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("analysis_manifest_v1.json"))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["modules"]["dynamics"]["status"], "ok");
        assert_eq!(parsed["modules"]["phase"]["status"], "skipped");

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["analysis_manifest_v1.json"]);
    }
}
