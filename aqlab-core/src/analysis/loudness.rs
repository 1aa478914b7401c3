//! Module 4.6.2 — Loudness (spec.md §4.6). Parses BS.1770/R128-style
//! per-frame diagnostic lines; `-inf` values are treated as `-120`.
//!
//! Wire format (our choice, spec.md §6 "filter graphs ... are
//! implementation choices"): one line per 100 ms frame on the decoder's
//! diagnostic stream, `LOUDNESS t=<sec> M=<LUFS> S=<LUFS> TPK=<dBTP> SPK=<dBFS>`.

use super::decode::run_with_retry;
use super::manifest::ModuleEntry;
use super::{write_series_artifact, ModuleContext};
use aqlab_common::Error;
use serde::{Deserialize, Serialize};

const FLOOR_LUFS: f32 = -120.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoudnessSeries {
    #[serde(rename = "tSec")]
    pub t_sec: Vec<f32>,
    #[serde(rename = "momentaryLUFS")]
    pub momentary_lufs: Vec<f32>,
    #[serde(rename = "shortTermLUFS")]
    pub short_term_lufs: Vec<f32>,
    #[serde(rename = "truePeakDbTP")]
    pub true_peak_dbtp: Vec<f32>,
    #[serde(rename = "samplePeakDbFS")]
    pub sample_peak_dbfs: Vec<f32>,
}

fn parse_value(raw: &str) -> Option<f32> {
    if raw.eq_ignore_ascii_case("-inf") {
        Some(FLOOR_LUFS)
    } else {
        raw.parse().ok()
    }
}

fn field(line: &str, key: &str) -> Option<f32> {
    line.split_whitespace()
        .find_map(|tok| tok.strip_prefix(&format!("{key}=")))
        .and_then(parse_value)
}

fn parse_frames(stderr: &str) -> LoudnessSeries {
    let mut series = LoudnessSeries::default();
    for line in stderr.lines().filter(|l| l.starts_with("LOUDNESS")) {
        let (Some(t), Some(m), Some(s), Some(tpk), Some(spk)) = (
            field(line, "t"),
            field(line, "M"),
            field(line, "S"),
            field(line, "TPK"),
            field(line, "SPK"),
        ) else {
            continue;
        };
        series.t_sec.push(t);
        series.momentary_lufs.push(m);
        series.short_term_lufs.push(s);
        series.true_peak_dbtp.push(tpk);
        series.sample_peak_dbfs.push(spk);
    }
    series
}

fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return FLOOR_LUFS;
    }
    let idx = ((sorted.len() - 1) as f32 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Gated energy-average of momentary loudness above a -70 LUFS absolute
/// gate, approximating BS.1770 integrated loudness without the relative
/// gate's second pass.
fn integrated_loudness(momentary: &[f32]) -> f32 {
    let gated: Vec<f32> = momentary.iter().copied().filter(|v| *v > -70.0).collect();
    if gated.is_empty() {
        return FLOOR_LUFS;
    }
    let mean_power: f64 = gated.iter().map(|db| 10f64.powf(*db as f64 / 10.0)).sum::<f64>() / gated.len() as f64;
    (10.0 * mean_power.log10()) as f32
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
        "ebur128=peak=true".to_string(),
        "-t".to_string(),
        ctx.duration_secs.to_string(),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let output = run_with_retry(ctx.decoder, &ctx.media_path, &args).await?;
    let stderr = String::from_utf8_lossy(output.stderr.as_bytes());
    let series = parse_frames(&stderr);

    if series.t_sec.is_empty() {
        return Err(Error::ParseFailure("no loudness frames decoded".into()));
    }

    let integrated = integrated_loudness(&series.momentary_lufs);

    let mut short_sorted = series.short_term_lufs.clone();
    short_sorted.retain(|v| *v > FLOOR_LUFS);
    short_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lra = percentile(&short_sorted, 0.95) - percentile(&short_sorted, 0.10);

    let max_true_peak = series.true_peak_dbtp.iter().cloned().fold(f32::MIN, f32::max);
    let max_sample_peak = series.sample_peak_dbfs.iter().cloned().fold(f32::MIN, f32::max);

    let raw = write_series_artifact(&ctx.artifact_dir, "loudness", &series).await?;

    let summary = serde_json::json!({
        "integratedLUFS": integrated,
        "LRA": lra.max(0.0),
        "maxTruePeak": max_true_peak,
        "maxSamplePeak": max_sample_peak,
    });

    let render_hints = serde_json::json!({
        "xAxis": "time",
        "primaryY": {"unit": "LUFS", "min": -60, "max": 0},
        "secondaryY": {"unit": "dBTP", "min": -60, "max": 3},
    });

    Ok(ModuleEntry::ok(summary, raw, render_hints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inf_is_treated_as_floor() {
        assert_eq!(parse_value("-inf"), Some(FLOOR_LUFS));
        assert_eq!(parse_value("-23.1"), Some(-23.1));
    }

    #[test]
    fn parses_loudness_lines() {
        let stderr = "LOUDNESS t=0.400 M=-23.1 S=-22.8 TPK=-1.2 SPK=-1.5\n\
                       LOUDNESS t=0.800 M=-inf S=-22.5 TPK=-1.0 SPK=-1.4\n";
        let series = parse_frames(stderr);
        assert_eq!(series.t_sec, vec![0.4, 0.8]);
        assert_eq!(series.momentary_lufs[1], FLOOR_LUFS);
    }

    #[test]
    fn integrated_loudness_ignores_gated_silence() {
        let momentary = vec![-120.0, -120.0, -14.0, -14.0, -14.0];
        let result = integrated_loudness(&momentary);
        assert!((result - (-14.0)).abs() < 0.5);
    }
}
