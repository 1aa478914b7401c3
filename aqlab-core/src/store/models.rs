//! Entity types shared by every `store::*` submodule (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported audio file extensions (lower-cased, no leading dot), per
/// spec.md §4.2 step 3.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "flac", "alac", "wav", "aiff", "aif", "mp3", "m4a", "aac", "ogg", "opus", "wma", "ape", "wv",
    "dsf", "dff",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryStatus {
    Pending,
    Success,
    Failed,
}

impl LibraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStatus::Pending => "pending",
            LibraryStatus::Success => "success",
            LibraryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => LibraryStatus::Success,
            "failed" => LibraryStatus::Failed,
            _ => LibraryStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub root_path: String,
    pub scan_interval: String,
    pub read_only: bool,
    pub output_path: Option<String>,
    pub allowed_formats: Option<Vec<String>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub status: LibraryStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFileStatus {
    Pending,
    Success,
    Failed,
    Deleted,
}

impl MediaFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFileStatus::Pending => "pending",
            MediaFileStatus::Success => "success",
            MediaFileStatus::Failed => "failed",
            MediaFileStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => MediaFileStatus::Success,
            "failed" => MediaFileStatus::Failed,
            "deleted" => MediaFileStatus::Deleted,
            _ => MediaFileStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: Uuid,
    pub library_id: Uuid,
    pub path: String,
    pub basename: String,
    pub extension: String,
    pub size_bytes: i64,
    pub mtime: DateTime<Utc>,
    pub quick_hash: Option<String>,
    pub full_hash: Option<String>,
    pub status: MediaFileStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub media_file_id: Uuid,
    pub duration_secs: f64,
    pub codec: String,
    pub sample_rate_hz: i64,
    /// 0 means unknown/lossy, per spec.md §3 "historical and explicit".
    pub bit_depth: i64,
    pub channels: i64,
    pub bitrate: Option<i64>,
    pub tags: TrackTags,
    pub has_artwork: bool,
    pub artwork_width: Option<i64>,
    pub artwork_height: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanRunStatus {
    Running,
    Success,
    Failed,
}

impl ScanRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanRunStatus::Running => "running",
            ScanRunStatus::Success => "success",
            ScanRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => ScanRunStatus::Success,
            "failed" => ScanRunStatus::Failed,
            _ => ScanRunStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanCounters {
    pub files_found: i64,
    pub files_new: i64,
    pub files_changed: i64,
    pub files_deleted: i64,
    pub files_failed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: Uuid,
    pub library_id: Uuid,
    pub status: ScanRunStatus,
    pub counters: ScanCounters,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Pass,
    Warn,
    Fail,
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityStatus::Pass => "pass",
            QualityStatus::Warn => "warn",
            QualityStatus::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warn" => QualityStatus::Warn,
            "fail" => QualityStatus::Fail,
            _ => QualityStatus::Pass,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: String,
    pub message: String,
    pub confidence: f64,
    pub artifact_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub track_id: Uuid,
    pub schema_version: i64,
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
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Artwork,
    Waveform,
    Spectrogram,
    AudioscanCurve,
    LoudnessSeries,
    ClippingSeries,
    PhaseSeries,
    DynamicsSeries,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Artwork => "artwork",
            ArtifactKind::Waveform => "waveform",
            ArtifactKind::Spectrogram => "spectrogram",
            ArtifactKind::AudioscanCurve => "audioscan_curve",
            ArtifactKind::LoudnessSeries => "loudness_series",
            ArtifactKind::ClippingSeries => "clipping_series",
            ArtifactKind::PhaseSeries => "phase_series",
            ArtifactKind::DynamicsSeries => "dynamics_series",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "artwork" => ArtifactKind::Artwork,
            "waveform" => ArtifactKind::Waveform,
            "spectrogram" => ArtifactKind::Spectrogram,
            "audioscan_curve" => ArtifactKind::AudioscanCurve,
            "loudness_series" => ArtifactKind::LoudnessSeries,
            "clipping_series" => ArtifactKind::ClippingSeries,
            "phase_series" => ArtifactKind::PhaseSeries,
            "dynamics_series" => ArtifactKind::DynamicsSeries,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub track_id: Uuid,
    pub kind: ArtifactKind,
    pub relative_path: String,
    pub mime_type: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Analyze,
    Audioscan,
    Convert,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Analyze => "analyze",
            JobType::Audioscan => "audioscan",
            JobType::Convert => "convert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "analyze" => JobType::Analyze,
            "audioscan" => JobType::Audioscan,
            "convert" => JobType::Convert,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
    Retry,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Retry => "retry",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "success" => JobStatus::Success,
            "failed" => JobStatus::Failed,
            "retry" => JobStatus::Retry,
            _ => JobStatus::Queued,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub target_type: String,
    pub target_id: Uuid,
    pub status: JobStatus,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Uuid,
    pub action_type: String,
    pub target_type: String,
    pub target_id: Uuid,
    pub actor: String,
    pub before_state: serde_json::Value,
    pub after_state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingValueType {
    String,
    Int,
    Bool,
    Json,
}

impl SettingValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingValueType::String => "string",
            SettingValueType::Int => "int",
            SettingValueType::Bool => "bool",
            SettingValueType::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "int" => SettingValueType::Int,
            "bool" => SettingValueType::Bool,
            "json" => SettingValueType::Json,
            _ => SettingValueType::String,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub value_type: SettingValueType,
    pub category: String,
}
