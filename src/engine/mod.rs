//! Grace-period early stopping: the pure stopping rule and the per-seed engine.

pub mod decision;
pub mod gesp;
