//! Small numeric helpers for sweeps: evenly spaced axes, means, and percentile bands.

#![allow(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use serde::{Deserialize, Serialize};

/// `points` evenly spaced values from `start` to `end`, both included.
///
/// A single point yields `[start]`; the last value is exactly `end`.
#[must_use]
pub fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            let mut values: Vec<f64> = (0..points).map(|i| start + step * i as f64).collect();
            values[points - 1] = end;
            values
        }
    }
}

/// `count` evenly spaced values strictly inside `(0, end)`.
#[must_use]
pub fn interior_points(end: f64, count: usize) -> Vec<f64> {
    let all = linspace(0.0, end, count + 2);
    all[1..=count].to_vec()
}

#[must_use]
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Quantile with linear interpolation between closest ranks.
///
/// Position `q * (n - 1)` in the sorted sample; `q` is clamped to `[0, 1]`.
#[must_use]
pub fn quantile(samples: &[f64], q: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let frac = position - lower as f64;
    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Interquartile band of one metric across seeds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

impl PercentileBand {
    #[must_use]
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            p25: quantile_sorted(&sorted, 0.25),
            p50: quantile_sorted(&sorted, 0.50),
            p75: quantile_sorted(&sorted, 0.75),
        })
    }
}
