//! In-memory episode table: per-seed ordered trajectories with shape invariants.
//!
//! Every trajectory in one [`RunTable`] has the same length, and every seed's
//! elapsed times are non-negative and non-decreasing. Both are enforced on
//! insertion so the engine and the sweeps never see a skewed table.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::errors::{GespError, Result};

/// Identifier of one independent repetition of an experiment.
pub type SeedId = u64;

/// One flat input row: `(seed, elapsed_time, trajectory)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub seed: SeedId,
    pub elapsed_time: f64,
    pub trajectory: Vec<f64>,
}

impl EpisodeRecord {
    pub fn new(seed: SeedId, elapsed_time: f64, trajectory: Vec<f64>) -> Self {
        Self {
            seed,
            elapsed_time,
            trajectory,
        }
    }
}

/// One evaluation episode inside a seed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub elapsed_time: f64,
    pub trajectory: Vec<f64>,
}

/// All episodes of a single seed, in the order they occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRun {
    seed: SeedId,
    episodes: Vec<Episode>,
}

impl SeedRun {
    fn new(seed: SeedId) -> Self {
        Self {
            seed,
            episodes: Vec::new(),
        }
    }

    #[must_use]
    pub fn seed(&self) -> SeedId {
        self.seed
    }

    #[must_use]
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Total recorded run time (elapsed time of the last episode).
    #[must_use]
    pub fn max_elapsed(&self) -> Option<f64> {
        self.episodes.last().map(|episode| episode.elapsed_time)
    }

    /// Trajectories in occurrence order.
    pub fn trajectories(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.episodes.iter().map(|episode| episode.trajectory.as_slice())
    }

    /// Episodes whose elapsed time is strictly below `cutoff`.
    ///
    /// Elapsed times are non-decreasing, so this is always a prefix.
    #[must_use]
    pub fn prefix_before(&self, cutoff: f64) -> &[Episode] {
        let end = self
            .episodes
            .partition_point(|episode| episode.elapsed_time < cutoff);
        &self.episodes[..end]
    }
}

/// Combined per-seed episode table for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTable {
    seeds: BTreeMap<SeedId, SeedRun>,
    trajectory_len: Option<usize>,
}

impl RunTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from flat records, preserving their order per seed.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = EpisodeRecord>,
    {
        let mut table = Self::new();
        for record in records {
            table.push(record)?;
        }
        Ok(table)
    }

    /// Append one episode to its seed's run.
    pub fn push(&mut self, record: EpisodeRecord) -> Result<()> {
        let EpisodeRecord {
            seed,
            elapsed_time,
            trajectory,
        } = record;

        if trajectory.is_empty() {
            return Err(GespError::DataInvariant {
                seed,
                details: "episode trajectory is empty".to_string(),
            });
        }
        if let Some(expected) = self.trajectory_len
            && expected != trajectory.len()
        {
            return Err(GespError::TrajectoryLength {
                expected,
                actual: trajectory.len(),
            });
        }
        if let Some(step) = trajectory.iter().position(|value| value.is_nan()) {
            return Err(GespError::DataInvariant {
                seed,
                details: format!("fitness at step {step} is NaN"),
            });
        }
        if !(elapsed_time.is_finite() && elapsed_time >= 0.0) {
            return Err(GespError::DataInvariant {
                seed,
                details: format!("elapsed time must be finite and non-negative, got {elapsed_time}"),
            });
        }

        let run = self.seeds.entry(seed).or_insert_with(|| SeedRun::new(seed));
        if let Some(previous) = run.max_elapsed()
            && elapsed_time < previous
        {
            return Err(GespError::DataInvariant {
                seed,
                details: format!(
                    "elapsed time went backwards at episode {}: {elapsed_time} < {previous}",
                    run.len()
                ),
            });
        }

        self.trajectory_len = Some(trajectory.len());
        run.episodes.push(Episode {
            elapsed_time,
            trajectory,
        });
        Ok(())
    }

    /// Steps per trajectory, once any episode has been added.
    #[must_use]
    pub fn trajectory_len(&self) -> Option<usize> {
        self.trajectory_len
    }

    /// Seed runs ordered by seed id.
    pub fn seeds(&self) -> impl Iterator<Item = &SeedRun> + '_ {
        self.seeds.values()
    }

    #[must_use]
    pub fn seed(&self, seed: SeedId) -> Option<&SeedRun> {
        self.seeds.get(&seed)
    }

    #[must_use]
    pub fn seed_ids(&self) -> Vec<SeedId> {
        self.seeds.keys().copied().collect()
    }

    #[must_use]
    pub fn seed_count(&self) -> usize {
        self.seeds.len()
    }

    /// Total number of episode records across all seeds.
    #[must_use]
    pub fn episode_count(&self) -> usize {
        self.seeds.values().map(SeedRun::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Largest elapsed time recorded by any seed.
    #[must_use]
    pub fn max_elapsed(&self) -> Option<f64> {
        self.seeds
            .values()
            .filter_map(SeedRun::max_elapsed)
            .reduce(f64::max)
    }

    /// Drop a seed entirely, returning its run.
    pub fn remove_seed(&mut self, seed: SeedId) -> Option<SeedRun> {
        self.seeds.remove(&seed)
    }

    /// Copy of the table restricted to episodes with `elapsed_time < cutoff`.
    ///
    /// Seeds without any episode before the cutoff are left out.
    #[must_use]
    pub fn truncated_before(&self, cutoff: f64) -> Self {
        let seeds = self
            .seeds
            .iter()
            .filter_map(|(&seed, run)| {
                let prefix = run.prefix_before(cutoff);
                (!prefix.is_empty()).then(|| {
                    (
                        seed,
                        SeedRun {
                            seed,
                            episodes: prefix.to_vec(),
                        },
                    )
                })
            })
            .collect();
        Self {
            seeds,
            trajectory_len: self.trajectory_len,
        }
    }

    /// Reject tables too small for a meaningful analysis (empty or single row).
    pub fn ensure_analyzable(&self) -> Result<()> {
        let rows = self.episode_count();
        if rows < 2 {
            return Err(GespError::InsufficientData {
                details: format!("episode table is empty or has a single row ({rows} rows)"),
            });
        }
        Ok(())
    }
}
