//! Artifact decimation (spec.md §4.6 "Artifact decimation"): downsample a
//! decompressed series for transport without shipping every raw point.

use aqlab_common::{Error, Result};

pub const DEFAULT_MAX_POINTS: usize = 1500;
pub const MAX_POINTS_CAP: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimationMethod {
    /// Smooth lines where visual fidelity of the curve's shape matters.
    Lttb,
    /// Series where losing a spike is unacceptable (clipping, true peak).
    MinMaxEnvelope,
}

/// `[startSec, endSec]` applied before downsampling.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub start_sec: f64,
    pub end_sec: f64,
}

fn window_indices(x: &[f32], window: Option<Window>) -> (usize, usize) {
    match window {
        Some(w) => {
            let start = x.partition_point(|v| (*v as f64) < w.start_sec);
            let end = x.partition_point(|v| (*v as f64) <= w.end_sec);
            (start, end.max(start))
        }
        None => (0, x.len()),
    }
}

fn clamp_max_points(max_points: usize) -> usize {
    max_points.clamp(2, MAX_POINTS_CAP)
}

/// Largest-Triangle-Three-Buckets. Always keeps the first and last points
/// of the (windowed) series; picks one point per interior bucket, the one
/// forming the largest triangle against the previously selected point and
/// the centroid of the next bucket.
pub fn lttb(x: &[f32], y: &[f32], max_points: usize) -> Result<(Vec<f32>, Vec<f32>)> {
    if x.len() != y.len() {
        return Err(Error::Validation("x and y series must be the same length".into()));
    }
    let n = x.len();
    let max_points = clamp_max_points(max_points);
    if n <= max_points || n < 3 {
        return Ok((x.to_vec(), y.to_vec()));
    }

    let mut out_x = Vec::with_capacity(max_points);
    let mut out_y = Vec::with_capacity(max_points);
    out_x.push(x[0]);
    out_y.push(y[0]);

    // n-2 interior buckets, sized to split the series excluding the fixed
    // first/last points evenly.
    let bucket_count = max_points - 2;
    let bucket_size = (n - 2) as f64 / bucket_count as f64;

    let mut a = 0usize;
    for bucket in 0..bucket_count {
        let bucket_start = (1.0 + bucket as f64 * bucket_size).floor() as usize;
        let bucket_end = (1.0 + (bucket + 1) as f64 * bucket_size).floor() as usize;
        let bucket_end = bucket_end.min(n - 1);
        let bucket_start = bucket_start.min(bucket_end);

        let next_start = bucket_end;
        let next_end = (1.0 + (bucket + 2) as f64 * bucket_size).floor() as usize;
        let next_end = next_end.min(n);
        let (next_cx, next_cy) = centroid(x, y, next_start, next_end.max(next_start + 1).min(n));

        let (ax, ay) = (x[a], y[a]);
        let mut best_idx = bucket_start;
        let mut best_area = -1.0f64;
        for i in bucket_start..bucket_end.max(bucket_start + 1).min(n) {
            let area = triangle_area(
                ax as f64,
                ay as f64,
                x[i] as f64,
                y[i] as f64,
                next_cx,
                next_cy,
            );
            if area > best_area {
                best_area = area;
                best_idx = i;
            }
        }

        out_x.push(x[best_idx]);
        out_y.push(y[best_idx]);
        a = best_idx;
    }

    out_x.push(x[n - 1]);
    out_y.push(y[n - 1]);
    Ok((out_x, out_y))
}

fn centroid(x: &[f32], y: &[f32], start: usize, end: usize) -> (f64, f64) {
    let start = start.min(x.len());
    let end = end.clamp(start, x.len());
    if end == start {
        let i = start.min(x.len().saturating_sub(1));
        return (x[i] as f64, y[i] as f64);
    }
    let count = (end - start) as f64;
    let sx: f64 = x[start..end].iter().map(|v| *v as f64).sum();
    let sy: f64 = y[start..end].iter().map(|v| *v as f64).sum();
    (sx / count, sy / count)
}

fn triangle_area(ax: f64, ay: f64, bx: f64, by: f64, cx: f64, cy: f64) -> f64 {
    ((ax - cx) * (by - cy) - (ax - bx) * (cy - ay)).abs() * 0.5
}

/// Per-bucket min/max envelope: each output bucket contributes its min and
/// max y value (paired with the bucket's representative x), so spikes in
/// either direction survive downsampling.
pub fn min_max_envelope(x: &[f32], y: &[f32], max_points: usize) -> Result<(Vec<f32>, Vec<f32>)> {
    if x.len() != y.len() {
        return Err(Error::Validation("x and y series must be the same length".into()));
    }
    let n = x.len();
    let max_points = clamp_max_points(max_points);
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    // Two output points per bucket (min, max), so halve the bucket budget.
    let bucket_count = (max_points / 2).max(1).min(n);
    if n <= max_points {
        return Ok((x.to_vec(), y.to_vec()));
    }

    let bucket_size = n as f64 / bucket_count as f64;
    let mut out_x = Vec::with_capacity(bucket_count * 2);
    let mut out_y = Vec::with_capacity(bucket_count * 2);

    for bucket in 0..bucket_count {
        let start = (bucket as f64 * bucket_size).floor() as usize;
        let end = (((bucket + 1) as f64 * bucket_size).floor() as usize).clamp(start + 1, n);

        let mut min_idx = start;
        let mut max_idx = start;
        for i in start..end {
            if y[i] < y[min_idx] {
                min_idx = i;
            }
            if y[i] > y[max_idx] {
                max_idx = i;
            }
        }

        // Emit in time order within the bucket so the output series stays
        // monotonically increasing on x.
        if min_idx <= max_idx {
            out_x.push(x[min_idx]);
            out_y.push(y[min_idx]);
            if max_idx != min_idx {
                out_x.push(x[max_idx]);
                out_y.push(y[max_idx]);
            }
        } else {
            out_x.push(x[max_idx]);
            out_y.push(y[max_idx]);
            out_x.push(x[min_idx]);
            out_y.push(y[min_idx]);
        }
    }

    Ok((out_x, out_y))
}

/// Filter to `window`, then downsample with `method`, capping `max_points`
/// at [`MAX_POINTS_CAP`] and defaulting to [`DEFAULT_MAX_POINTS`] when 0.
pub fn decimate(
    x: &[f32],
    y: &[f32],
    max_points: usize,
    method: DecimationMethod,
    window: Option<Window>,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let (start, end) = window_indices(x, window);
    let x = &x[start..end];
    let y = &y[start..end];
    let max_points = if max_points == 0 { DEFAULT_MAX_POINTS } else { max_points };

    match method {
        DecimationMethod::Lttb => lttb(x, y, max_points),
        DecimationMethod::MinMaxEnvelope => min_max_envelope(x, y, max_points),
    }
}
