//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use gesp_analysis::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{GespError, Result};

// Engine
pub use crate::engine::decision::{EpisodeDecision, first_stop_index};
pub use crate::engine::gesp::{CurvePoint, GespEngine};

// Data
pub use crate::data::loader::{LoadedRun, load_result_dir};
pub use crate::data::preprocess::{PreprocessOutcome, drop_short_seeds};
pub use crate::data::table::{EpisodeRecord, RunTable, SeedId};

// Analysis
pub use crate::analysis::report::{AnalysisReport, PreparedRun};
pub use crate::analysis::seed::{Metric, SeedMetrics, evaluate_seed, replay_seed};
pub use crate::analysis::sweep::{
    GraceSweep, GraceTimeSweep, SweepRunner, grace_axis, time_sweep_axes,
};
