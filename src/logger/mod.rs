//! Activity logging: JSONL event log with rotation and fallback.

pub mod jsonl;
