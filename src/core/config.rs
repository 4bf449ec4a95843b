//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{GespError, Result};

/// Full analysis configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub sweep: SweepConfig,
    pub time_sweep: TimeSweepConfig,
    pub preprocess: PreprocessConfig,
    pub paths: PathsConfig,
}

/// Where per-seed result logs live and how they are named.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputConfig {
    pub results_dir: PathBuf,
    /// File-name prefix selecting one experiment's logs in `results_dir`.
    pub experiment_name: String,
    pub file_extension: String,
}

/// Grace-only sweep range and worker pool size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub grace_min: f64,
    pub grace_max: f64,
    pub grace_points: usize,
    pub parallelism: usize,
}

/// Grace × elapsed-time sweep resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeSweepConfig {
    /// Grace values are spread over the full `[0, 1]` range.
    pub grace_points: usize,
    /// Number of cutoffs strictly inside `(0, horizon)`.
    pub time_partitions: usize,
}

/// Data-quality filter applied before any sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Seeds whose total run time is below `retention_fraction * cohort_max` are dropped.
    pub retention_fraction: f64,
}

/// Filesystem paths used by gesp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
    pub jsonl_fallback: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results/data/tgrace_experiment"),
            experiment_name: "veenstra".to_string(),
            file_extension: "txt".to_string(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            grace_min: 0.2,
            grace_max: 1.0,
            grace_points: 30,
            parallelism: std::thread::available_parallelism().map_or(1, std::num::NonZero::get),
        }
    }
}

impl Default for TimeSweepConfig {
    fn default() -> Self {
        Self {
            grace_points: 11,
            time_partitions: 11,
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            retention_fraction: 0.9,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[GESP-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("gesp").join("config.toml");
        let data = home_dir.join(".local").join("share").join("gesp");
        Self {
            config_file: cfg,
            jsonl_log: data.join("activity.jsonl"),
            jsonl_fallback: Some(env::temp_dir().join("gesp-activity.jsonl")),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| GespError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(GespError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config, stamped into reports.
    ///
    /// FNV-1a over canonical JSON so the value is stable across processes.
    /// Worker count and local paths cannot change results and are left out,
    /// so the same analysis hashes identically on every machine.
    pub fn stable_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("paths");
            if let Some(sweep) = fields.get_mut("sweep").and_then(serde_json::Value::as_object_mut)
            {
                sweep.remove("parallelism");
            }
        }
        let canonical = serde_json::to_string(&value)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // input
        if let Some(raw) = lookup("GESP_INPUT_RESULTS_DIR") {
            self.input.results_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("GESP_INPUT_EXPERIMENT_NAME") {
            self.input.experiment_name = raw;
        }
        if let Some(raw) = lookup("GESP_INPUT_FILE_EXTENSION") {
            self.input.file_extension = raw;
        }

        // sweep
        override_parsed(&mut lookup, "GESP_SWEEP_GRACE_MIN", &mut self.sweep.grace_min)?;
        override_parsed(&mut lookup, "GESP_SWEEP_GRACE_MAX", &mut self.sweep.grace_max)?;
        override_parsed(
            &mut lookup,
            "GESP_SWEEP_GRACE_POINTS",
            &mut self.sweep.grace_points,
        )?;
        override_parsed(
            &mut lookup,
            "GESP_SWEEP_PARALLELISM",
            &mut self.sweep.parallelism,
        )?;

        // time sweep
        override_parsed(
            &mut lookup,
            "GESP_TIME_SWEEP_GRACE_POINTS",
            &mut self.time_sweep.grace_points,
        )?;
        override_parsed(
            &mut lookup,
            "GESP_TIME_SWEEP_TIME_PARTITIONS",
            &mut self.time_sweep.time_partitions,
        )?;

        // preprocess
        override_parsed(
            &mut lookup,
            "GESP_PREPROCESS_RETENTION_FRACTION",
            &mut self.preprocess.retention_fraction,
        )?;

        // paths
        if let Some(raw) = lookup("GESP_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.experiment_name.trim().is_empty() {
            return Err(GespError::InvalidConfig {
                details: "input.experiment_name must not be empty".to_string(),
            });
        }
        if self.input.file_extension.trim().is_empty() {
            return Err(GespError::InvalidConfig {
                details: "input.file_extension must not be empty".to_string(),
            });
        }

        validate_prob("sweep.grace_min", self.sweep.grace_min)?;
        validate_prob("sweep.grace_max", self.sweep.grace_max)?;
        if self.sweep.grace_min > self.sweep.grace_max {
            return Err(GespError::InvalidConfig {
                details: format!(
                    "sweep.grace_min ({}) must be <= sweep.grace_max ({})",
                    self.sweep.grace_min, self.sweep.grace_max
                ),
            });
        }
        if self.sweep.grace_points == 0 {
            return Err(GespError::InvalidConfig {
                details: "sweep.grace_points must be >= 1".to_string(),
            });
        }
        if self.sweep.parallelism == 0 {
            return Err(GespError::InvalidConfig {
                details: "sweep.parallelism must be >= 1".to_string(),
            });
        }

        if self.time_sweep.grace_points == 0 || self.time_sweep.time_partitions == 0 {
            return Err(GespError::InvalidConfig {
                details: "time_sweep.grace_points and time_sweep.time_partitions must be >= 1"
                    .to_string(),
            });
        }

        let fraction = self.preprocess.retention_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(GespError::InvalidConfig {
                details: format!("preprocess.retention_fraction must be in (0, 1], got {fraction}"),
            });
        }

        Ok(())
    }
}

fn validate_prob(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(GespError::InvalidConfig {
            details: format!("{name} must be in [0,1], got {value}"),
        });
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn override_parsed<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<T>().map_err(|error| GespError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, GespError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_sweep_matches_reference_experiment() {
        let cfg = Config::default();
        assert!((cfg.sweep.grace_min - 0.2).abs() < f64::EPSILON);
        assert!((cfg.sweep.grace_max - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.sweep.grace_points, 30);
        assert_eq!(cfg.time_sweep.grace_points, 11);
        assert_eq!(cfg.time_sweep.time_partitions, 11);
        assert!((cfg.preprocess.retention_fraction - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn grace_bounds_must_be_ordered() {
        let mut cfg = Config::default();
        cfg.sweep.grace_min = 0.8;
        cfg.sweep.grace_max = 0.3;
        let err = cfg.validate().expect_err("expected ordering error");
        assert!(err.to_string().contains("grace_min"));
    }

    #[test]
    fn grace_outside_unit_interval_rejected() {
        let mut cfg = Config::default();
        cfg.sweep.grace_max = 1.5;
        let err = cfg.validate().expect_err("expected range error");
        match err {
            GespError::InvalidConfig { details } => assert!(details.contains("grace_max")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_points_rejected() {
        let mut cfg = Config::default();
        cfg.sweep.grace_points = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.time_sweep.time_partitions = 0;
        let err = cfg.validate().expect_err("expected partitions error");
        assert!(err.to_string().contains("time_partitions"));
    }

    #[test]
    fn retention_fraction_must_be_positive_and_at_most_one() {
        for bad in [0.0, -0.1, 1.01] {
            let mut cfg = Config::default();
            cfg.preprocess.retention_fraction = bad;
            let err = cfg.validate().expect_err("expected retention error");
            assert!(err.to_string().contains("retention_fraction"));
        }
        let mut cfg = Config::default();
        cfg.preprocess.retention_fraction = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_experiment_name_rejected() {
        let mut cfg = Config::default();
        cfg.input.experiment_name = "  ".to_string();
        let err = cfg.validate().expect_err("expected name error");
        assert!(err.to_string().contains("experiment_name"));
    }

    #[test]
    fn env_overrides_apply_to_every_section() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("GESP_INPUT_RESULTS_DIR", "/data/runs"),
            ("GESP_INPUT_EXPERIMENT_NAME", "hardrace"),
            ("GESP_SWEEP_GRACE_MIN", "0.1"),
            ("GESP_SWEEP_GRACE_POINTS", "5"),
            ("GESP_SWEEP_PARALLELISM", "3"),
            ("GESP_TIME_SWEEP_TIME_PARTITIONS", "4"),
            ("GESP_PREPROCESS_RETENTION_FRACTION", "0.75"),
            ("GESP_PATHS_JSONL_LOG", "/tmp/gesp/log.jsonl"),
        ]);

        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");

        assert_eq!(cfg.input.results_dir, PathBuf::from("/data/runs"));
        assert_eq!(cfg.input.experiment_name, "hardrace");
        assert!((cfg.sweep.grace_min - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.sweep.grace_points, 5);
        assert_eq!(cfg.sweep.parallelism, 3);
        assert_eq!(cfg.time_sweep.time_partitions, 4);
        assert!((cfg.preprocess.retention_fraction - 0.75).abs() < f64::EPSILON);
        assert_eq!(cfg.paths.jsonl_log, PathBuf::from("/tmp/gesp/log.jsonl"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("GESP_SWEEP_GRACE_POINTS", "many")]);

        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid integer should fail");
        match err {
            GespError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("GESP_SWEEP_GRACE_POINTS"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/gesp/config.toml")));
        assert!(matches!(result, Err(GespError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_partial_toml_and_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[sweep]\ngrace_points = 7\n\n[input]\nexperiment_name = \"obstacles\"\n",
        )
        .expect("write config");

        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.sweep.grace_points, 7);
        assert_eq!(cfg.input.experiment_name, "obstacles");
        assert_eq!(cfg.input.file_extension, "txt");
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn toml_rendering_parses_back() {
        let cfg = Config::default();
        let rendered = cfg.to_toml().expect("render");
        let parsed: Config = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().expect("hash should compute");
        let mut modified = Config::default();
        modified.sweep.grace_points += 1;
        let after = modified.stable_hash().expect("hash should compute");
        assert_ne!(before, after);
        assert_eq!(before, cfg.stable_hash().expect("hash"));
    }

    #[test]
    fn stable_hash_ignores_worker_count_and_paths() {
        let mut one = Config::default();
        one.sweep.parallelism = 1;
        let mut many = Config::default();
        many.sweep.parallelism = 64;
        many.paths.jsonl_log = PathBuf::from("/elsewhere/activity.jsonl");
        many.paths.config_file = PathBuf::from("/elsewhere/config.toml");
        assert_eq!(
            one.stable_hash().expect("hash"),
            many.stable_hash().expect("hash")
        );
    }
}
