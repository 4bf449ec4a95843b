//! Run preprocessing: drop seeds whose recorded run time is far below the cohort's.
//!
//! A seed whose total elapsed time is below `retention_fraction * cohort_max`
//! is considered an incomplete run. It is removed as a whole and reported, and
//! the analysis continues with the remaining seeds.

#![allow(missing_docs)]

use serde::Serialize;

use crate::core::errors::{GespError, Result};
use crate::data::table::{RunTable, SeedId};

/// Default share of the cohort's longest run a seed must reach to be kept.
pub const DEFAULT_RETENTION_FRACTION: f64 = 0.9;

/// A seed excluded by the run-time filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardedSeed {
    pub seed: SeedId,
    pub max_elapsed: f64,
}

/// Table restricted to representative seeds, plus what was dropped.
#[derive(Debug, Clone)]
pub struct PreprocessOutcome {
    pub table: RunTable,
    pub retained: Vec<SeedId>,
    pub discarded: Vec<DiscardedSeed>,
    /// Longest run time among all seeds before filtering.
    pub cohort_max_elapsed: f64,
    /// `retention_fraction * cohort_max_elapsed`; every retained seed reaches it,
    /// so it bounds the time cutoffs of the grace × time sweep.
    pub horizon: f64,
}

/// Summary of a [`PreprocessOutcome`] without the table, for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessSummary {
    pub retained: Vec<SeedId>,
    pub discarded: Vec<DiscardedSeed>,
    pub cohort_max_elapsed: f64,
    pub horizon: f64,
    pub retention_fraction: f64,
}

impl PreprocessOutcome {
    #[must_use]
    pub fn summary(&self, retention_fraction: f64) -> PreprocessSummary {
        PreprocessSummary {
            retained: self.retained.clone(),
            discarded: self.discarded.clone(),
            cohort_max_elapsed: self.cohort_max_elapsed,
            horizon: self.horizon,
            retention_fraction,
        }
    }
}

/// Apply the run-time retention filter.
pub fn drop_short_seeds(mut table: RunTable, retention_fraction: f64) -> Result<PreprocessOutcome> {
    if !(retention_fraction > 0.0 && retention_fraction <= 1.0) {
        return Err(GespError::InvalidConfig {
            details: format!("retention fraction must be in (0, 1], got {retention_fraction}"),
        });
    }
    table.ensure_analyzable()?;

    let per_seed: Vec<(SeedId, f64)> = table
        .seeds()
        .filter_map(|run| run.max_elapsed().map(|max| (run.seed(), max)))
        .collect();
    let cohort_max_elapsed = per_seed
        .iter()
        .map(|(_, max)| *max)
        .reduce(f64::max)
        .unwrap_or(0.0);
    let horizon = cohort_max_elapsed * retention_fraction;

    let mut discarded = Vec::new();
    for &(seed, max_elapsed) in &per_seed {
        if max_elapsed < horizon {
            table.remove_seed(seed);
            discarded.push(DiscardedSeed { seed, max_elapsed });
        }
    }

    Ok(PreprocessOutcome {
        retained: table.seed_ids(),
        table,
        discarded,
        cohort_max_elapsed,
        horizon,
    })
}
