//! Synthetic run generator for demos and pipeline tests.
//!
//! Models an optimizer that slowly improves: each episode is a noisy fitness
//! ramp whose plateau drifts upward across the run, with a random onset so
//! that some better episodes start "behind schedule".

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::errors::{GespError, Result};
use crate::data::table::{EpisodeRecord, RunTable, SeedId};
use crate::data::writer::TrajectoryLogger;

/// Shape of a synthetic experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticRunConfig {
    pub seeds: u64,
    /// First seed id; seeds are numbered consecutively from here.
    pub first_seed: SeedId,
    pub episodes: usize,
    pub steps: usize,
    /// Wall-clock seconds spent per simulated step.
    pub seconds_per_step: f64,
    /// The last `truncated_seeds` seeds stop after roughly a third of their episodes.
    pub truncated_seeds: u64,
    pub noise: f64,
}

impl Default for SyntheticRunConfig {
    fn default() -> Self {
        Self {
            seeds: 10,
            first_seed: 2,
            episodes: 200,
            steps: 100,
            seconds_per_step: 0.1,
            truncated_seeds: 1,
            noise: 0.01,
        }
    }
}

impl SyntheticRunConfig {
    fn validate(&self) -> Result<()> {
        if self.seeds == 0 || self.episodes == 0 || self.steps == 0 {
            return Err(GespError::InvalidConfig {
                details: "synthetic run needs at least one seed, episode and step".to_string(),
            });
        }
        if self.truncated_seeds >= self.seeds {
            return Err(GespError::InvalidConfig {
                details: format!(
                    "truncated_seeds ({}) must leave at least one complete seed out of {}",
                    self.truncated_seeds, self.seeds
                ),
            });
        }
        if !(self.seconds_per_step > 0.0 && self.seconds_per_step.is_finite()) {
            return Err(GespError::InvalidConfig {
                details: "seconds_per_step must be a positive number".to_string(),
            });
        }
        if !(self.noise >= 0.0 && self.noise.is_finite()) {
            return Err(GespError::InvalidConfig {
                details: "noise must be a non-negative number".to_string(),
            });
        }
        Ok(())
    }

    fn episodes_for(&self, seed_index: u64) -> usize {
        if seed_index >= self.seeds - self.truncated_seeds {
            (self.episodes / 3).max(1)
        } else {
            self.episodes
        }
    }
}

/// Generate all seeds' episodes in memory.
pub fn generate_records(config: &SyntheticRunConfig, rng_seed: u64) -> Result<Vec<EpisodeRecord>> {
    config.validate()?;
    let mut records = Vec::new();
    for seed_index in 0..config.seeds {
        let seed = config.first_seed + seed_index;
        let mut rng = StdRng::seed_from_u64(rng_seed ^ seed.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let mut elapsed = 0.0;
        for episode in 0..config.episodes_for(seed_index) {
            let progress = episode as f64 / config.episodes as f64;
            let trajectory = episode_trajectory(config, progress, &mut rng);
            elapsed += config.steps as f64 * config.seconds_per_step * rng.random_range(0.8..1.2);
            records.push(EpisodeRecord::new(seed, elapsed, trajectory));
        }
    }
    Ok(records)
}

/// Generate a synthetic run as a [`RunTable`].
pub fn generate_table(config: &SyntheticRunConfig, rng_seed: u64) -> Result<RunTable> {
    RunTable::from_records(generate_records(config, rng_seed)?)
}

/// Write one result log per seed into `dir`, named `<experiment>_result_<seed>.txt`.
pub fn write_run(
    dir: &Path,
    experiment: &str,
    config: &SyntheticRunConfig,
    rng_seed: u64,
    replace_existing: bool,
) -> Result<Vec<PathBuf>> {
    let records = generate_records(config, rng_seed)?;
    let mut written = Vec::new();
    let mut current: Option<(SeedId, TrajectoryLogger)> = None;

    for record in records {
        let switch = current.as_ref().is_none_or(|(seed, _)| *seed != record.seed);
        if switch {
            if let Some((_, logger)) = current.take() {
                written.push(logger.finish()?);
            }
            let path = dir.join(format!("{experiment}_result_{}.txt", record.seed));
            current = Some((
                record.seed,
                TrajectoryLogger::create(&path, replace_existing, 1)?,
            ));
        }
        if let Some((_, logger)) = current.as_mut() {
            logger.log_values(record.elapsed_time, &record.trajectory)?;
        }
    }
    if let Some((_, logger)) = current.take() {
        written.push(logger.finish()?);
    }
    Ok(written)
}

fn episode_trajectory(config: &SyntheticRunConfig, progress: f64, rng: &mut StdRng) -> Vec<f64> {
    let steps = config.steps as f64;
    let plateau = rng.random_range(0.0..1.0) * (0.5 + 0.5 * progress);
    let onset = rng.random_range(0.0..0.4) * steps;
    let span = (steps - onset).max(1.0);

    let mut best = f64::NEG_INFINITY;
    (0..config.steps)
        .map(|step| {
            let ramp = ((step as f64 - onset) / span).clamp(0.0, 1.0);
            let jitter = if config.noise > 0.0 {
                rng.random_range(-config.noise..config.noise)
            } else {
                0.0
            };
            // Fitness is reported as the best value reached so far in the episode.
            best = best.max(plateau * ramp + jitter);
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticRunConfig {
        SyntheticRunConfig {
            seeds: 4,
            first_seed: 2,
            episodes: 30,
            steps: 20,
            seconds_per_step: 0.5,
            truncated_seeds: 1,
            noise: 0.01,
        }
    }

    #[test]
    fn generation_is_deterministic_per_rng_seed() {
        let a = generate_records(&small(), 42).expect("gen");
        let b = generate_records(&small(), 42).expect("gen");
        let c = generate_records(&small(), 43).expect("gen");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn truncated_seed_runs_shorter() {
        let table = generate_table(&small(), 7).expect("table");
        assert_eq!(table.seed_ids(), vec![2, 3, 4, 5]);
        assert_eq!(table.seed(2).expect("seed").len(), 30);
        assert_eq!(table.seed(5).expect("seed").len(), 10);
        assert_eq!(table.trajectory_len(), Some(20));
    }

    #[test]
    fn trajectories_are_running_maxima() {
        let table = generate_table(&small(), 11).expect("table");
        for run in table.seeds() {
            for trajectory in run.trajectories() {
                assert!(trajectory.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[test]
    fn rejects_all_seeds_truncated() {
        let mut cfg = small();
        cfg.truncated_seeds = cfg.seeds;
        assert!(generate_records(&cfg, 1).is_err());
    }

    #[test]
    fn written_run_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = write_run(dir.path(), "synth", &small(), 5, false).expect("write");
        assert_eq!(paths.len(), 4);

        let loaded = crate::data::loader::load_result_dir(dir.path(), "synth", "txt").expect("load");
        let expected = generate_table(&small(), 5).expect("table");
        assert_eq!(loaded.table.seed_ids(), expected.seed_ids());
        assert_eq!(loaded.table.episode_count(), expected.episode_count());
    }
}
