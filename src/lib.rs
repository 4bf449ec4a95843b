#![forbid(unsafe_code)]

//! GESP analysis: grace-period early stopping for evolutionary experiment logs.
//!
//! The crate replays recorded fitness trajectories through a grace-window
//! stopping rule and measures, across seeds, how much compute early stopping
//! would have saved and what it would have cost:
//! 1. **Engine**: the pure stopping rule plus a per-seed stateful replay engine
//! 2. **Data**: result-log reading and writing, run-time filtering, synthetic runs
//! 3. **Analysis**: per-seed metrics, grace and grace × time sweeps, reports
//!
//! # Library usage
//!
//! ```rust,no_run
//! use gesp_analysis::prelude::*;
//!
//! # fn main() -> gesp_analysis::prelude::Result<()> {
//! let config = Config::load(None)?;
//! let run = PreparedRun::load(&config)?;
//! let grace = grace_axis(0.2, 1.0, 9);
//! let sweep = SweepRunner::default().grace_sweep(&run.outcome.table, &grace)?;
//! for row in sweep.curve(Metric::FramesRatio) {
//!     println!("{:.2} {:.3}", row.grace, row.p50);
//! }
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod analysis;
pub mod core;
pub mod data;
pub mod engine;
pub mod logger;
