//! Pure grace-window stopping rule.
//!
//! Given the current trajectory, the reference trajectory and a grace window of
//! `g` steps, the episode is stopped at the first index `i` where
//!
//! ```text
//! max(current[i], current[i + g]) < min(reference[i], reference[i + g])
//! ```
//!
//! i.e. where even the optimistic reading of the current episode is worse than
//! the pessimistic reading of the reference, allowing either one to lead or lag
//! the other by up to `g` steps.

#![allow(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{GespError, Result};

/// Outcome of evaluating one episode under the stopping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDecision {
    /// Steps that had to be simulated before the decision was final.
    pub frames_evaluated: usize,
    /// The episode's final fitness beats the reference (always true for the first episode).
    pub found_new_best: bool,
    pub was_early_stopped: bool,
}

/// Reject grace proportions outside `[0, 1]` (NaN included).
pub fn check_grace(grace_proportion: f64) -> Result<()> {
    if (0.0..=1.0).contains(&grace_proportion) {
        Ok(())
    } else {
        Err(GespError::GraceOutOfRange {
            value: grace_proportion,
        })
    }
}

/// Grace window length in steps for a trajectory of `len` steps.
///
/// Halfway cases round to even, so `0.5 * 5` gives a window of 2 steps.
pub fn grace_steps(grace_proportion: f64, len: usize) -> Result<usize> {
    check_grace(grace_proportion)?;
    let steps = (grace_proportion * len as f64).round_ties_even() as usize;
    Ok(steps.min(len))
}

/// First index at which the current trajectory is provably behind the reference.
///
/// Returns `None` when no index in `0..len - grace_steps` satisfies the rule,
/// including the degenerate case `grace_steps >= len` where there is nothing
/// to compare.
#[must_use]
pub fn first_stop_index(current: &[f64], reference: &[f64], grace_steps: usize) -> Option<usize> {
    debug_assert_eq!(current.len(), reference.len());
    let window = current.len().min(reference.len()).saturating_sub(grace_steps);
    (0..window).find(|&i| {
        let optimistic_current = current[i].max(current[i + grace_steps]);
        let pessimistic_reference = reference[i].min(reference[i + grace_steps]);
        optimistic_current < pessimistic_reference
    })
}

/// Number of frames simulated when stopping at `stop_index`.
#[must_use]
pub const fn frames_at_stop(stop_index: usize, grace_steps: usize) -> usize {
    stop_index + grace_steps + 1
}
