//! Module 4.6.4 — Phase (spec.md §4.6). Stereo only; skipped for mono.
//! Uses an aphasemeter-equivalent correlation value uniformly, per the
//! Open Question resolution preferring aphasemeter over an RMS proxy.
//!
//! Wire format (our choice): `PHASE t=<sec> corr=<value> rms1=<dB> rms2=<dB>`.

use super::decode::run_with_retry;
use super::manifest::ModuleEntry;
use super::{write_series_artifact, ModuleContext};
use aqlab_common::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseSeries {
    #[serde(rename = "tSec")]
    pub t_sec: Vec<f32>,
    pub correlation: Vec<f32>,
    #[serde(rename = "lrBalanceDb")]
    pub lr_balance_db: Vec<f32>,
}

fn field(line: &str, key: &str) -> Option<f32> {
    line.split_whitespace()
        .find_map(|tok| tok.strip_prefix(&format!("{key}=")))
        .and_then(|v| v.parse().ok())
}

fn parse_frames(stderr: &str) -> PhaseSeries {
    let mut series = PhaseSeries::default();
    for line in stderr.lines().filter(|l| l.starts_with("PHASE")) {
        let (Some(t), Some(corr), Some(rms1), Some(rms2)) = (
            field(line, "t"),
            field(line, "corr"),
            field(line, "rms1"),
            field(line, "rms2"),
        ) else {
            continue;
        };
        series.t_sec.push(t);
        series.correlation.push(corr);
        series.lr_balance_db.push(rms1 - rms2);
    }
    series
}

pub async fn run(ctx: &ModuleContext<'_>) -> ModuleEntry {
    if ctx.probe_cache.channels != 2 {
        return ModuleEntry::skipped("Mono track - phase analysis not applicable");
    }

    match run_inner(ctx).await {
        Ok(entry) => entry,
        Err(e) => ModuleEntry::error(e.to_string(), None),
    }
}

async fn run_inner(ctx: &ModuleContext<'_>) -> aqlab_common::Result<ModuleEntry> {
    let args = vec![
        "-af".to_string(),
        "aphasemeter=video=0".to_string(),
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
        return Err(Error::ParseFailure("no phase frames decoded".into()));
    }

    let min_corr = series.correlation.iter().cloned().fold(f32::MAX, f32::min);
    let avg_corr = series.correlation.iter().sum::<f32>() / series.correlation.len() as f32;
    let max_imbalance = series
        .lr_balance_db
        .iter()
        .cloned()
        .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap())
        .unwrap_or(0.0);
    let negative_count = series.correlation.iter().filter(|c| **c < 0.0).count();
    let phase_issue = (negative_count as f64 / series.correlation.len() as f64) > 0.25;

    let raw = write_series_artifact(&ctx.artifact_dir, "phase", &series).await?;

    let summary = serde_json::json!({
        "minCorrelation": min_corr,
        "avgCorrelation": avg_corr,
        "maxImbalanceDb": max_imbalance,
        "phaseIssue": phase_issue,
    });

    let render_hints = serde_json::json!({
        "xAxis": "time",
        "yMin": -1,
        "yMax": 1,
    });

    Ok(ModuleEntry::ok(summary, raw, render_hints))
}
