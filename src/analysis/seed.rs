//! Per-seed replay and the three summary metrics derived from it.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{GespError, Result};
use crate::engine::decision::EpisodeDecision;
use crate::engine::gesp::{CurvePoint, GespEngine};

/// Which per-seed metric a sweep curve or matrix reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Share of would-be new bests that early stopping cut off.
    MissedBest,
    /// Compute spent relative to a full episode.
    FramesRatio,
    /// Whether the unstopped run was ahead at equal compute.
    WorseWithStopping,
}

impl Metric {
    pub const ALL: [Self; 3] = [Self::MissedBest, Self::FramesRatio, Self::WorseWithStopping];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::MissedBest => "missed_best",
            Self::FramesRatio => "frames_ratio",
            Self::WorseWithStopping => "worse_with_stopping",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MissedBest => "missed new best",
            Self::FramesRatio => "frames evaluated ratio",
            Self::WorseWithStopping => "worse with stopping",
        }
    }
}

/// Summary of one seed replayed at one grace proportion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedMetrics {
    pub missed: f64,
    pub frames_ratio: f64,
    pub relative_quality: f64,
}

impl SeedMetrics {
    #[must_use]
    pub const fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::MissedBest => self.missed,
            Metric::FramesRatio => self.frames_ratio,
            Metric::WorseWithStopping => self.relative_quality,
        }
    }
}

/// Full replay of a seed: every decision plus the derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedReplay {
    pub grace: f64,
    pub decisions: Vec<EpisodeDecision>,
    pub steps_no_stop: u64,
    pub steps_with_stop: u64,
    pub best_f_no_stop: f64,
    pub best_f_with_stop: f64,
    pub metrics: SeedMetrics,
}

/// Replay a seed's episodes in order through a fresh engine.
pub fn replay_seed<'a, I>(trajectories: I, grace_proportion: f64) -> Result<SeedReplay>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut engine = GespEngine::new();
    let decisions = engine.replay(trajectories, grace_proportion)?;
    let metrics = summarize(&engine, &decisions)?;
    Ok(SeedReplay {
        grace: grace_proportion,
        steps_no_stop: engine.steps_no_stop(),
        steps_with_stop: engine.steps_with_stop(),
        best_f_no_stop: engine.best_f_no_stop().unwrap_or(f64::NEG_INFINITY),
        best_f_with_stop: engine.best_f_with_stop().unwrap_or(f64::NEG_INFINITY),
        decisions,
        metrics,
    })
}

/// Metrics only; see [`replay_seed`] for the decisions as well.
pub fn evaluate_seed<'a, I>(trajectories: I, grace_proportion: f64) -> Result<SeedMetrics>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut engine = GespEngine::new();
    let decisions = engine.replay(trajectories, grace_proportion)?;
    summarize(&engine, &decisions)
}

fn summarize(engine: &GespEngine, decisions: &[EpisodeDecision]) -> Result<SeedMetrics> {
    let Some(first) = decisions.first() else {
        return Err(GespError::InsufficientData {
            details: "seed has no episodes to replay".to_string(),
        });
    };

    // The first episode is always a new best, so this is never empty.
    let new_bests: Vec<&EpisodeDecision> = decisions.iter().filter(|d| d.found_new_best).collect();
    let missed = new_bests.iter().filter(|d| d.was_early_stopped).count() as f64
        / new_bests.len() as f64;

    let mean_frames = decisions
        .iter()
        .map(|d| d.frames_evaluated as f64)
        .sum::<f64>()
        / decisions.len() as f64;
    let frames_ratio = mean_frames / first.frames_evaluated as f64;

    let with_stop_final = engine.with_stop_curve().last().copied().ok_or_else(|| {
        GespError::InsufficientData {
            details: "with-stop curve is empty".to_string(),
        }
    })?;
    let relative_quality = compare_at_equal_compute(engine.no_stop_curve(), with_stop_final)?;

    Ok(SeedMetrics {
        missed,
        frames_ratio,
        relative_quality,
    })
}

/// Compare the unstopped run against the stopped run's final state at the
/// same amount of compute.
///
/// Uses the last no-stop point whose cumulative steps do not exceed
/// `with_stop.steps`. Returns 1.0 when the unstopped run is strictly ahead,
/// 0.0 when it is behind and 0.5 on an exact tie.
pub fn compare_at_equal_compute(no_stop: &[CurvePoint], with_stop: CurvePoint) -> Result<f64> {
    let comparable = no_stop.partition_point(|point| point.steps <= with_stop.steps);
    let Some(index) = comparable.checked_sub(1) else {
        return Err(GespError::EmptyCurve {
            step: with_stop.steps,
        });
    };
    let unstopped = no_stop[index].best_fitness;
    Ok(if unstopped > with_stop.best_fitness {
        1.0
    } else if unstopped < with_stop.best_fitness {
        0.0
    } else {
        0.5
    })
}
