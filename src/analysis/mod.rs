//! Per-seed metrics, parameter sweeps, and report assembly.

pub mod report;
pub mod seed;
pub mod stats;
pub mod sweep;
