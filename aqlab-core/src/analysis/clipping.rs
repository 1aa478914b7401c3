//! Module 4.6.3 — Clipping (spec.md §4.6). Aggregates per-channel
//! per-frame peak metadata to a per-frame max, quantized to >= 20 ms
//! spacing between retained entries.
//!
//! Wire format (our choice): `CLIP t=<sec> ch=<n> peak=<dB>`, one line per
//! channel per frame on the decoder's diagnostic stream.

use super::decode::run_with_retry;
use super::manifest::ModuleEntry;
use super::{write_series_artifact, ModuleContext};
use aqlab_common::Error;
use serde::{Deserialize, Serialize};

const MIN_SPACING_SECS: f32 = 0.020;
const DEFAULT_THRESHOLD_DBFS: f32 = -0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClippingSeries {
    #[serde(rename = "tSec")]
    pub t_sec: Vec<f32>,
    #[serde(rename = "clippedSamples")]
    pub clipped_samples: Vec<i32>,
    #[serde(rename = "oversCount")]
    pub overs_count: Vec<i32>,
}

fn field(line: &str, key: &str) -> Option<f32> {
    line.split_whitespace()
        .find_map(|tok| tok.strip_prefix(&format!("{key}=")))
        .and_then(|v| v.parse().ok())
}

/// Per-frame max peak across channels, frame-ordered.
fn frame_peaks(stderr: &str) -> Vec<(f32, f32)> {
    use std::collections::BTreeMap;
    let mut by_time: BTreeMap<u64, f32> = BTreeMap::new();
    for line in stderr.lines().filter(|l| l.starts_with("CLIP")) {
        let (Some(t), Some(peak)) = (field(line, "t"), field(line, "peak")) else {
            continue;
        };
        let key = (t * 1000.0).round() as u64;
        by_time
            .entry(key)
            .and_modify(|existing| *existing = existing.max(peak))
            .or_insert(peak);
    }
    by_time.into_iter().map(|(ms, peak)| (ms as f32 / 1000.0, peak)).collect()
}

fn quantize(frames: &[(f32, f32)]) -> ClippingSeries {
    let mut series = ClippingSeries::default();
    let mut last_kept: Option<f32> = None;
    for &(t, peak) in frames {
        if last_kept.map(|lt| t - lt < MIN_SPACING_SECS).unwrap_or(false) {
            continue;
        }
        last_kept = Some(t);
        series.t_sec.push(t);
        series.clipped_samples.push(if peak >= DEFAULT_THRESHOLD_DBFS { 1 } else { 0 });
        series.overs_count.push(0);
    }
    series
}

pub async fn run(ctx: &ModuleContext<'_>) -> ModuleEntry {
    match run_inner(ctx).await {
        Ok(entry) => entry,
        Err(e) => ModuleEntry::error(e.to_string(), None),
    }
}

async fn run_inner(ctx: &ModuleContext<'_>) -> aqlab_common::Result<ModuleEntry> {
    let args = vec![
        "-af".to_string(),
        "astats=metadata=1:reset=1".to_string(),
        "-t".to_string(),
        ctx.duration_secs.to_string(),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let output = run_with_retry(ctx.decoder, &ctx.media_path, &args).await?;
    let stderr = String::from_utf8_lossy(output.stderr.as_bytes());
    let frames = frame_peaks(&stderr);

    if frames.is_empty() {
        return Err(Error::ParseFailure("no clipping frames decoded".into()));
    }

    let series = quantize(&frames);
    let total_clipped: i64 = series.clipped_samples.iter().map(|v| *v as i64).sum();
    let worst_section_idx = series
        .clipped_samples
        .iter()
        .enumerate()
        .max_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let raw = write_series_artifact(&ctx.artifact_dir, "clipping", &series).await?;

    let summary = serde_json::json!({
        "totalClipped": total_clipped,
        "totalOvers": 0,
        "worstSectionIdx": worst_section_idx,
    });

    let render_hints = serde_json::json!({
        "xAxis": "time",
        "thresholdDbFS": DEFAULT_THRESHOLD_DBFS,
    });

    Ok(ModuleEntry::ok(summary, raw, render_hints))
}
