//! Grace and grace × time sweeps over a preprocessed run table.
//!
//! Every sweep is flattened into independent jobs, one per (configuration
//! point, seed) pair. Each job replays one seed through its own engine, so
//! jobs share nothing but the read-only table. Workers pull jobs from a
//! bounded channel and send `(index, result)` pairs back; results are placed
//! into indexed slots so the output never depends on scheduling order.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;
use std::thread;

use crossbeam_channel as channel;
use serde::Serialize;

use crate::analysis::seed::{Metric, SeedMetrics, evaluate_seed};
use crate::analysis::stats::{PercentileBand, interior_points, linspace, mean};
use crate::core::errors::{GespError, Result};
use crate::data::table::{Episode, RunTable, SeedId, SeedRun};
use crate::engine::decision::check_grace;

/// Progress callback: `(completed_jobs, total_jobs)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Grace values for the grace sweep, both bounds included.
#[must_use]
pub fn grace_axis(grace_min: f64, grace_max: f64, points: usize) -> Vec<f64> {
    linspace(grace_min, grace_max, points)
}

/// Axes of the grace × time sweep: grace over `[0, 1]` and cutoffs strictly
/// inside `(0, horizon)`.
#[must_use]
pub fn time_sweep_axes(
    grace_points: usize,
    time_partitions: usize,
    horizon: f64,
) -> (Vec<f64>, Vec<f64>) {
    (
        linspace(0.0, 1.0, grace_points),
        interior_points(horizon, time_partitions),
    )
}

/// A configuration point that produced no value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepNotice {
    pub grace: Option<f64>,
    pub time_cutoff: Option<f64>,
    pub message: String,
}

/// One grace value of the grace sweep with the interquartile band of each metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GracePoint {
    pub grace: f64,
    pub seeds: usize,
    pub missed_best: PercentileBand,
    pub frames_ratio: PercentileBand,
    pub worse_with_stopping: PercentileBand,
}

impl GracePoint {
    #[must_use]
    pub const fn band(&self, metric: Metric) -> PercentileBand {
        match metric {
            Metric::MissedBest => self.missed_best,
            Metric::FramesRatio => self.frames_ratio,
            Metric::WorseWithStopping => self.worse_with_stopping,
        }
    }
}

/// `(grace, p25, p50, p75)` row of a metric curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandRow {
    pub grace: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraceSweep {
    pub seeds: Vec<SeedId>,
    pub points: Vec<GracePoint>,
}

impl GraceSweep {
    /// Ordered `(grace, p25, p50, p75)` sequence for one metric.
    #[must_use]
    pub fn curve(&self, metric: Metric) -> Vec<BandRow> {
        self.points
            .iter()
            .map(|point| {
                let band = point.band(metric);
                BandRow {
                    grace: point.grace,
                    p25: band.p25,
                    p50: band.p50,
                    p75: band.p75,
                }
            })
            .collect()
    }
}

/// Mean per-seed metrics on a grace × time-cutoff grid.
///
/// Matrices are indexed `[grace][cutoff]`. A `None` cell means no seed had an
/// episode before that cutoff; it serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraceTimeSweep {
    pub grace_values: Vec<f64>,
    pub time_cutoffs: Vec<f64>,
    pub seeds_per_cutoff: Vec<usize>,
    pub missed_best: Vec<Vec<Option<f64>>>,
    pub frames_ratio: Vec<Vec<Option<f64>>>,
    pub worse_with_stopping: Vec<Vec<Option<f64>>>,
    pub notices: Vec<SweepNotice>,
}

impl GraceTimeSweep {
    #[must_use]
    pub fn matrix(&self, metric: Metric) -> &[Vec<Option<f64>>] {
        match metric {
            Metric::MissedBest => &self.missed_best,
            Metric::FramesRatio => &self.frames_ratio,
            Metric::WorseWithStopping => &self.worse_with_stopping,
        }
    }
}

/// Executes sweeps on a fixed-size worker pool.
#[derive(Clone)]
pub struct SweepRunner {
    parallelism: usize,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for SweepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepRunner")
            .field("parallelism", &self.parallelism)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

struct SeedJob<'a> {
    grace: f64,
    episodes: &'a [Episode],
}

impl SweepRunner {
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            progress: None,
        }
    }

    /// Run everything on the calling thread.
    #[must_use]
    pub fn sequential() -> Self {
        Self::new(1)
    }

    /// Set a callback invoked as each job finishes.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Evaluate every seed at every grace value and reduce each metric to its
    /// interquartile band.
    pub fn grace_sweep(&self, table: &RunTable, grace_values: &[f64]) -> Result<GraceSweep> {
        for &grace in grace_values {
            check_grace(grace)?;
        }
        if table.is_empty() {
            return Err(GespError::InsufficientData {
                details: "grace sweep needs at least one seed".to_string(),
            });
        }

        let runs: Vec<&[Episode]> = table.seeds().map(|run| run.episodes()).collect();
        let jobs: Vec<SeedJob<'_>> = grace_values
            .iter()
            .flat_map(|&grace| {
                runs.iter()
                    .map(move |&episodes| SeedJob { grace, episodes })
            })
            .collect();

        let results = self.run_jobs(&jobs, evaluate_job);
        let mut metrics = results.into_iter();

        let mut points = Vec::with_capacity(grace_values.len());
        for &grace in grace_values {
            let per_seed: Vec<SeedMetrics> = metrics
                .by_ref()
                .take(runs.len())
                .collect::<Result<_>>()?;
            points.push(GracePoint {
                grace,
                seeds: per_seed.len(),
                missed_best: band_of(&per_seed, Metric::MissedBest)?,
                frames_ratio: band_of(&per_seed, Metric::FramesRatio)?,
                worse_with_stopping: band_of(&per_seed, Metric::WorseWithStopping)?,
            });
        }

        Ok(GraceSweep {
            seeds: table.seed_ids(),
            points,
        })
    }

    /// Mean per-seed metrics for each (grace, cutoff) pair, each seed restricted
    /// to episodes that finished before the cutoff.
    pub fn grace_time_sweep(
        &self,
        table: &RunTable,
        grace_values: &[f64],
        time_cutoffs: &[f64],
    ) -> Result<GraceTimeSweep> {
        for &grace in grace_values {
            check_grace(grace)?;
        }
        if table.is_empty() {
            return Err(GespError::InsufficientData {
                details: "grace x time sweep needs at least one seed".to_string(),
            });
        }

        // Each cell is analysed as its own table; cells below two episode
        // records are left empty like cells without any seed.
        let cells: Vec<RunTable> = time_cutoffs
            .iter()
            .map(|&cutoff| table.truncated_before(cutoff))
            .collect();
        let prefixes: Vec<Vec<&[Episode]>> = cells
            .iter()
            .map(|cell| match cell.ensure_analyzable() {
                Ok(()) => cell.seeds().map(SeedRun::episodes).collect(),
                Err(_) => Vec::new(),
            })
            .collect();
        let seeds_per_cutoff: Vec<usize> = prefixes.iter().map(Vec::len).collect();

        let jobs: Vec<SeedJob<'_>> = grace_values
            .iter()
            .flat_map(|&grace| {
                prefixes.iter().flat_map(move |column| {
                    column
                        .iter()
                        .map(move |&episodes| SeedJob { grace, episodes })
                })
            })
            .collect();

        let results = self.run_jobs(&jobs, evaluate_job);
        let mut metrics = results.into_iter();

        let rows = grace_values.len();
        let cols = time_cutoffs.len();
        let mut missed_best = vec![vec![None; cols]; rows];
        let mut frames_ratio = vec![vec![None; cols]; rows];
        let mut worse_with_stopping = vec![vec![None; cols]; rows];

        for row in 0..rows {
            for (col, &seeds) in seeds_per_cutoff.iter().enumerate() {
                let per_seed: Vec<SeedMetrics> = metrics
                    .by_ref()
                    .take(seeds)
                    .collect::<Result<_>>()?;
                missed_best[row][col] = mean_of(&per_seed, Metric::MissedBest);
                frames_ratio[row][col] = mean_of(&per_seed, Metric::FramesRatio);
                worse_with_stopping[row][col] = mean_of(&per_seed, Metric::WorseWithStopping);
            }
        }

        let notices = time_cutoffs
            .iter()
            .zip(&cells)
            .zip(&seeds_per_cutoff)
            .filter(|(_, seeds)| **seeds == 0)
            .map(|((&cutoff, cell), _)| {
                let message = if cell.is_empty() {
                    format!("no seed has an episode before t={cutoff:.3}; column left empty")
                } else {
                    format!("fewer than two episodes before t={cutoff:.3}; column left empty")
                };
                SweepNotice {
                    grace: None,
                    time_cutoff: Some(cutoff),
                    message,
                }
            })
            .collect();

        Ok(GraceTimeSweep {
            grace_values: grace_values.to_vec(),
            time_cutoffs: time_cutoffs.to_vec(),
            seeds_per_cutoff,
            missed_best,
            frames_ratio,
            worse_with_stopping,
            notices,
        })
    }

    /// Run `work` over all jobs, returning results in job order.
    fn run_jobs<J, T, F>(&self, jobs: &[J], work: F) -> Vec<T>
    where
        J: Sync,
        T: Send,
        F: Fn(&J) -> T + Sync,
    {
        let total = jobs.len();
        let workers = self.parallelism.min(total);
        if workers <= 1 {
            return jobs
                .iter()
                .enumerate()
                .map(|(index, job)| {
                    let value = work(job);
                    self.report_progress(index + 1, total);
                    value
                })
                .collect();
        }

        let (job_tx, job_rx) = channel::bounded::<(usize, &J)>(workers * 4);
        let (result_tx, result_rx) = channel::unbounded::<(usize, T)>();
        let work = &work;

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (index, job) in &job_rx {
                        if result_tx.send((index, work(job))).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            scope.spawn(move || {
                for item in jobs.iter().enumerate() {
                    if job_tx.send(item).is_err() {
                        return;
                    }
                }
            });

            let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
            let mut completed = 0;
            for (index, value) in &result_rx {
                slots[index] = Some(value);
                completed += 1;
                self.report_progress(completed, total);
            }
            // A slot stays empty only if a worker panicked, which the scope re-raises.
            slots.into_iter().flatten().collect()
        })
    }

    fn report_progress(&self, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(completed, total);
        }
    }
}

impl Default for SweepRunner {
    fn default() -> Self {
        Self::new(thread::available_parallelism().map_or(1, usize::from))
    }
}

fn evaluate_job(job: &SeedJob<'_>) -> Result<SeedMetrics> {
    evaluate_seed(
        job.episodes.iter().map(|episode| episode.trajectory.as_slice()),
        job.grace,
    )
}

fn band_of(per_seed: &[SeedMetrics], metric: Metric) -> Result<PercentileBand> {
    let samples: Vec<f64> = per_seed.iter().map(|m| m.get(metric)).collect();
    PercentileBand::from_samples(&samples).ok_or_else(|| GespError::InsufficientData {
        details: format!("no seed samples for {}", metric.key()),
    })
}

fn mean_of(per_seed: &[SeedMetrics], metric: Metric) -> Option<f64> {
    let samples: Vec<f64> = per_seed.iter().map(|m| m.get(metric)).collect();
    mean(&samples)
}
