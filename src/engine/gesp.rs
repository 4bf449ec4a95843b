//! Stateful GESP engine: one instance replays one seed's episodes in order.
//!
//! The engine owns the reference trajectory (best full episode seen so far) and
//! two cumulative compute/fitness curves, one for the run as it was actually
//! executed (no stopping) and one for the run as it would have gone with
//! early stopping. Both curves grow by one point per decided episode.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{GespError, Result};
use crate::engine::decision::{EpisodeDecision, check_grace, first_stop_index, frames_at_stop, grace_steps};

/// Cumulative compute spent and best fitness held after an episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub steps: u64,
    pub best_fitness: f64,
}

/// Per-seed early-stopping engine.
#[derive(Debug, Clone, Default)]
pub struct GespEngine {
    reference: Option<Vec<f64>>,
    expected_length: Option<usize>,
    no_stop_curve: Vec<CurvePoint>,
    with_stop_curve: Vec<CurvePoint>,
}

impl GespEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; required before replaying another seed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Decide how much of `trajectory` would have been simulated, then update state.
    pub fn decide(&mut self, trajectory: &[f64], grace_proportion: f64) -> Result<EpisodeDecision> {
        check_grace(grace_proportion)?;
        let Some(&last) = trajectory.last() else {
            return Err(GespError::InsufficientData {
                details: "trajectory has no fitness observations".to_string(),
            });
        };
        if let Some(expected) = self.expected_length
            && expected != trajectory.len()
        {
            return Err(GespError::TrajectoryLength {
                expected,
                actual: trajectory.len(),
            });
        }

        let len = trajectory.len();
        let decision = match self.reference.as_deref() {
            None => {
                self.reference = Some(trajectory.to_vec());
                self.expected_length = Some(len);
                EpisodeDecision {
                    frames_evaluated: len,
                    found_new_best: true,
                    was_early_stopped: false,
                }
            }
            Some(reference) => {
                let reference_final = reference[reference.len() - 1];
                let found_new_best = last > reference_final;
                let g = grace_steps(grace_proportion, len)?;
                match first_stop_index(trajectory, reference, g) {
                    Some(index) => EpisodeDecision {
                        frames_evaluated: frames_at_stop(index, g),
                        found_new_best,
                        was_early_stopped: true,
                    },
                    None => {
                        if found_new_best {
                            self.reference = Some(trajectory.to_vec());
                        }
                        EpisodeDecision {
                            frames_evaluated: len,
                            found_new_best,
                            was_early_stopped: false,
                        }
                    }
                }
            }
        };

        self.record(len, last, decision.frames_evaluated);
        Ok(decision)
    }

    /// Replay a whole ordered sequence of trajectories through this engine.
    pub fn replay<'a, I>(&mut self, trajectories: I, grace_proportion: f64) -> Result<Vec<EpisodeDecision>>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        trajectories
            .into_iter()
            .map(|trajectory| self.decide(trajectory, grace_proportion))
            .collect()
    }

    fn record(&mut self, len: usize, final_fitness: f64, frames_evaluated: usize) {
        let (steps_no_stop, best_no_stop) = self
            .no_stop_curve
            .last()
            .map_or((0, f64::NEG_INFINITY), |point| (point.steps, point.best_fitness));
        self.no_stop_curve.push(CurvePoint {
            steps: steps_no_stop + len as u64,
            best_fitness: best_no_stop.max(final_fitness),
        });

        let steps_with_stop = self.with_stop_curve.last().map_or(0, |point| point.steps);
        let reference_final = self
            .reference
            .as_deref()
            .and_then(<[f64]>::last)
            .copied()
            .unwrap_or(f64::NEG_INFINITY);
        self.with_stop_curve.push(CurvePoint {
            steps: steps_with_stop + frames_evaluated as u64,
            best_fitness: reference_final,
        });
    }

    /// Current reference trajectory, if any episode has been decided.
    #[must_use]
    pub fn reference(&self) -> Option<&[f64]> {
        self.reference.as_deref()
    }

    #[must_use]
    pub fn expected_length(&self) -> Option<usize> {
        self.expected_length
    }

    /// Number of episodes decided since the last reset.
    #[must_use]
    pub fn episodes(&self) -> usize {
        self.no_stop_curve.len()
    }

    /// Compute/fitness curve of the run without early stopping.
    #[must_use]
    pub fn no_stop_curve(&self) -> &[CurvePoint] {
        &self.no_stop_curve
    }

    /// Compute/fitness curve of the run with early stopping.
    #[must_use]
    pub fn with_stop_curve(&self) -> &[CurvePoint] {
        &self.with_stop_curve
    }

    #[must_use]
    pub fn steps_no_stop(&self) -> u64 {
        self.no_stop_curve.last().map_or(0, |point| point.steps)
    }

    #[must_use]
    pub fn steps_with_stop(&self) -> u64 {
        self.with_stop_curve.last().map_or(0, |point| point.steps)
    }

    #[must_use]
    pub fn best_f_no_stop(&self) -> Option<f64> {
        self.no_stop_curve.last().map(|point| point.best_fitness)
    }

    #[must_use]
    pub fn best_f_with_stop(&self) -> Option<f64> {
        self.with_stop_curve.last().map(|point| point.best_fitness)
    }
}
