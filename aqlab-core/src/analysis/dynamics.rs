//! Module 4.6.5 — Dynamics (spec.md §4.6). Per-frame crest factor from
//! peak and RMS level, summarized into a DR score.
//!
//! Wire format (our choice): `DYNAMICS t=<sec> peak=<dB> rms=<dB>`.

use super::decode::run_with_retry;
use super::manifest::ModuleEntry;
use super::{write_series_artifact, ModuleContext};
use aqlab_common::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicsSeries {
    #[serde(rename = "tSec")]
    pub t_sec: Vec<f32>,
    #[serde(rename = "crestDb")]
    pub crest_db: Vec<f32>,
}

fn field(line: &str, key: &str) -> Option<f32> {
    line.split_whitespace()
        .find_map(|tok| tok.strip_prefix(&format!("{key}=")))
        .and_then(|v| v.parse().ok())
}

fn parse_frames(stderr: &str) -> DynamicsSeries {
    let mut series = DynamicsSeries::default();
    for line in stderr.lines().filter(|l| l.starts_with("DYNAMICS")) {
        let (Some(t), Some(peak), Some(rms)) = (field(line, "t"), field(line, "peak"), field(line, "rms")) else {
            continue;
        };
        series.t_sec.push(t);
        series.crest_db.push((peak - rms).max(0.0));
    }
    series
}

/// `clamp(round(avgCrestDb), 1, 20)` (spec.md §4.6).
pub fn dr_score(avg_crest_db: f32) -> i64 {
    (avg_crest_db.round() as i64).clamp(1, 20)
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
    let series = parse_frames(&stderr);

    if series.t_sec.is_empty() {
        return Err(Error::ParseFailure("no dynamics frames decoded".into()));
    }

    let avg_crest = series.crest_db.iter().sum::<f32>() / series.crest_db.len() as f32;
    let min_crest = series
        .crest_db
        .iter()
        .cloned()
        .filter(|v| *v > 0.0)
        .fold(f32::MAX, f32::min);
    let min_crest = if min_crest.is_finite() { min_crest } else { 0.0 };

    let raw = write_series_artifact(&ctx.artifact_dir, "dynamics", &series).await?;

    let summary = serde_json::json!({
        "avgCrestDb": avg_crest,
        "minCrestDb": min_crest,
        "DRScore": dr_score(avg_crest),
    });

    let render_hints = serde_json::json!({
        "xAxis": "time",
        "yMin": 0,
        "yMax": 25,
        "units": "dB",
    });

    Ok(ModuleEntry::ok(summary, raw, render_hints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dr_score_clamps_to_spec_range() {
        assert_eq!(dr_score(0.2), 1);
        assert_eq!(dr_score(14.4), 14);
        assert_eq!(dr_score(25.0), 20);
    }

    #[test]
    fn crest_factor_is_never_negative() {
        let stderr = "DYNAMICS t=0.0 peak=-10.0 rms=-5.0\n";
        let series = parse_frames(stderr);
        assert_eq!(series.crest_db, vec![0.0]);
    }

    #[test]
    fn crest_factor_reflects_peak_minus_rms() {
        let stderr = "DYNAMICS t=0.0 peak=-3.0 rms=-15.0\n";
        let series = parse_frames(stderr);
        assert!((series.crest_db[0] - 12.0).abs() < 1e-6);
    }
}
