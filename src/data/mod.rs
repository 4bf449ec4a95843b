//! Episode data: the per-seed trajectory table, result-log reading and writing,
//! run-time filtering, and synthetic runs.

pub mod loader;
pub mod preprocess;
pub mod synth;
pub mod table;
pub mod writer;
