//! Module 4.6.1 — Spectrum (`audioscan`, spec.md §4.6). FFT size 4096, hop
//! 1024, Hann window, mono downmix, 0.25-octave smoothing. Replaces the
//! synthesized-curve behavior noted in the Open Questions with a genuine
//! FFT over decoded PCM (spec.md §9).

use super::decode::run_with_retry;
use super::manifest::ModuleEntry;
use super::{write_series_artifact, ModuleContext};
use aqlab_common::Error;
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

const FFT_SIZE: usize = 4096;
const HOP_SIZE: usize = 1024;
const DC_FLAG_THRESHOLD: f32 = 0.001;
const BANDWIDTH_DROP_DB: f32 = 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumSeries {
    #[serde(rename = "freqHz")]
    pub freq_hz: Vec<f32>,
    #[serde(rename = "levelDb")]
    pub level_db: Vec<f32>,
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos())
        .collect()
}

fn decode_mono_pcm(stdout: &[u8]) -> Vec<f32> {
    stdout
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Average power spectrum over all overlapping FFT_SIZE frames.
fn average_spectrum(samples: &[f32]) -> Vec<f32> {
    let window = hann_window(FFT_SIZE);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);

    let bins = FFT_SIZE / 2 + 1;
    let mut accum = vec![0f64; bins];
    let mut frame_count = 0usize;

    let mut start = 0;
    while start + FFT_SIZE <= samples.len() {
        let mut buffer: Vec<Complex32> = samples[start..start + FFT_SIZE]
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex32::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        for (i, slot) in accum.iter_mut().enumerate().take(bins) {
            *slot += (buffer[i].norm() as f64).powi(2);
        }
        frame_count += 1;
        start += HOP_SIZE;
    }

    if frame_count == 0 {
        return Vec::new();
    }
    accum.iter().map(|v| (*v / frame_count as f64) as f32).collect()
}

fn smooth_quarter_octave(freq_hz: &[f32], level_db: &[f32]) -> Vec<f32> {
    let mut out = vec![0f32; level_db.len()];
    for (i, &f0) in freq_hz.iter().enumerate() {
        if f0 <= 0.0 {
            out[i] = level_db[i];
            continue;
        }
        let lo = f0 / 2f32.powf(0.125);
        let hi = f0 * 2f32.powf(0.125);
        let mut sum = 0f64;
        let mut count = 0u32;
        for (j, &fj) in freq_hz.iter().enumerate() {
            if fj >= lo && fj <= hi {
                sum += level_db[j] as f64;
                count += 1;
            }
        }
        out[i] = if count > 0 { (sum / count as f64) as f32 } else { level_db[i] };
    }
    out
}

fn expected_quality(bit_depth: Option<i64>, sample_rate_hz: i64) -> &'static str {
    match (bit_depth, sample_rate_hz) {
        (Some(bd), sr) if bd >= 24 && sr > 48_000 => "Hi-Res",
        (Some(bd), sr) if bd >= 24 && sr >= 44_100 => "Studio",
        (Some(bd), sr) if bd >= 16 && sr >= 44_100 => "CD Quality",
        (Some(_), _) => "Lossless",
        (None, _) => "Lossy",
    }
}

fn detected_quality(bandwidth_hz: f32, nyquist: f32) -> &'static str {
    if bandwidth_hz == 0.0 || bandwidth_hz >= nyquist - 1000.0 {
        "Full Bandwidth"
    } else if bandwidth_hz < 16_000.0 {
        "Possible Transcode"
    } else if bandwidth_hz < 20_000.0 {
        "Bandwidth Limited"
    } else {
        "Good"
    }
}

pub async fn run(ctx: &ModuleContext<'_>) -> ModuleEntry {
    match run_inner(ctx).await {
        Ok(entry) => entry,
        Err(e) => ModuleEntry::error(e.to_string(), None),
    }
}

async fn run_inner(ctx: &ModuleContext<'_>) -> aqlab_common::Result<ModuleEntry> {
    let sample_rate_hz = ctx.probe_cache.sample_rate_hz.max(1) as f32;
    let args = vec![
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        sample_rate_hz.to_string(),
        "-t".to_string(),
        ctx.duration_secs.to_string(),
        "-f".to_string(),
        "s16le".to_string(),
        "-".to_string(),
    ];

    let output = run_with_retry(ctx.decoder, &ctx.media_path, &args).await?;
    let samples = decode_mono_pcm(&output.stdout);
    if samples.is_empty() {
        return Err(Error::DecoderFailure("no PCM samples decoded for spectrum analysis".into()));
    }

    let power = average_spectrum(&samples);
    if power.is_empty() {
        return Err(Error::DecoderFailure("not enough samples for a single FFT frame".into()));
    }

    let bin_hz = sample_rate_hz / FFT_SIZE as f32;
    let freq_hz: Vec<f32> = (0..power.len()).map(|i| i as f32 * bin_hz).collect();

    let ref_power = power.iter().cloned().fold(0f32, f32::max).max(1e-12);
    let level_db_raw: Vec<f32> = power.iter().map(|p| 10.0 * (p / ref_power).max(1e-12).log10()).collect();
    let level_db = smooth_quarter_octave(&freq_hz, &level_db_raw);

    let dc_mean = samples.iter().sum::<f32>() / samples.len() as f32;
    let dc_flagged = dc_mean.abs() > DC_FLAG_THRESHOLD;

    let (peak_bin, _) = level_db
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap_or((0, &0.0));
    let peak_db = level_db[peak_bin];

    let mut bandwidth_hz = 0f32;
    for i in (1..level_db.len()).rev() {
        if level_db[i] > peak_db - BANDWIDTH_DROP_DB {
            bandwidth_hz = freq_hz[i];
            break;
        }
    }

    let nyquist = sample_rate_hz / 2.0;
    let mut guides: Vec<f32> = vec![nyquist, 20_000.0, 16_000.0, 12_000.0]
        .into_iter()
        .filter(|f| *f >= 0.0 && *f <= nyquist)
        .collect();
    guides.sort_by(|a, b| a.partial_cmp(b).unwrap());
    guides.dedup();

    let series = SpectrumSeries { freq_hz, level_db };
    let raw = write_series_artifact(&ctx.artifact_dir, "audioscan", &series).await?;

    let summary = serde_json::json!({
        "dcMean": dc_mean,
        "dcFlagged": dc_flagged,
        "bandwidthHz": bandwidth_hz,
        "expectedQuality": expected_quality(ctx.probe_cache.bit_depth, ctx.probe_cache.sample_rate_hz),
        "detectedQuality": detected_quality(bandwidth_hz, nyquist),
        "guideFrequenciesHz": guides,
    });

    let render_hints = serde_json::json!({
        "xScale": "log",
        "minFreq": 10_000,
        "maxFreq": nyquist,
        "minDb": -80,
        "maxDb": 0,
        "units": "Hz/dB",
    });

    Ok(ModuleEntry::ok(summary, raw, render_hints))
}
