//! Load → preprocess pipeline and the JSON report envelope around sweep results.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{GespError, Result};
use crate::data::loader::{InputFile, load_result_dir};
use crate::data::preprocess::{PreprocessOutcome, PreprocessSummary, drop_short_seeds};

/// A loaded and filtered run, ready for sweeps.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub experiment: String,
    pub results_dir: PathBuf,
    pub inputs: Vec<InputFile>,
    pub outcome: PreprocessOutcome,
    pub retention_fraction: f64,
}

impl PreparedRun {
    /// Read every result file of the configured experiment and drop short seeds.
    pub fn load(config: &Config) -> Result<Self> {
        let input = &config.input;
        let loaded = load_result_dir(
            &input.results_dir,
            &input.experiment_name,
            &input.file_extension,
        )?;
        let retention_fraction = config.preprocess.retention_fraction;
        let outcome = drop_short_seeds(loaded.table, retention_fraction)?;
        Ok(Self {
            experiment: input.experiment_name.clone(),
            results_dir: input.results_dir.clone(),
            inputs: loaded.inputs,
            outcome,
            retention_fraction,
        })
    }

    /// Wrap `result` with provenance for this run.
    pub fn report<T: Serialize>(
        &self,
        config: &Config,
        kind: ReportKind,
        result: T,
    ) -> Result<AnalysisReport<T>> {
        Ok(AnalysisReport {
            kind,
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            config_hash: config.stable_hash()?,
            experiment: self.experiment.clone(),
            results_dir: self.results_dir.clone(),
            inputs: self.inputs.clone(),
            preprocess: self.outcome.summary(self.retention_fraction),
            result,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Seeds,
    Replay,
    GraceSweep,
    GraceTimeSweep,
}

/// Self-describing analysis output.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport<T: Serialize> {
    pub kind: ReportKind,
    pub generated_at: DateTime<Utc>,
    pub tool_version: &'static str,
    pub config_hash: String,
    pub experiment: String,
    pub results_dir: PathBuf,
    pub inputs: Vec<InputFile>,
    pub preprocess: PreprocessSummary,
    pub result: T,
}

impl<T: Serialize> AnalysisReport<T> {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| GespError::io(parent, source))?;
        }
        let mut body = self.to_json_pretty()?;
        body.push('\n');
        fs::write(path, body).map_err(|source| GespError::io(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synth::{SyntheticRunConfig, write_run};

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::default();
        config.input.results_dir = dir.to_path_buf();
        config.input.experiment_name = "demo".to_string();
        config
    }

    #[test]
    fn prepared_run_drops_truncated_seed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = SyntheticRunConfig {
            seeds: 3,
            episodes: 60,
            steps: 10,
            ..SyntheticRunConfig::default()
        };
        write_run(dir.path(), "demo", &synth, 3, false).expect("write");

        let run = PreparedRun::load(&config_for(dir.path())).expect("load");
        assert_eq!(run.inputs.len(), 3);
        assert_eq!(run.outcome.retained, vec![2, 3]);
        assert_eq!(run.outcome.discarded.len(), 1);
        assert_eq!(run.outcome.discarded[0].seed, 4);
    }

    #[test]
    fn report_serializes_with_provenance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let synth = SyntheticRunConfig {
            episodes: 40,
            steps: 10,
            ..SyntheticRunConfig::default()
        };
        write_run(dir.path(), "demo", &synth, 1, false).expect("write");
        let config = config_for(dir.path());
        let run = PreparedRun::load(&config).expect("load");

        let report = run
            .report(&config, ReportKind::Seeds, run.outcome.retained.clone())
            .expect("report");
        let out = dir.path().join("reports").join("seeds.json");
        report.write_to(&out).expect("write report");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).expect("read")).expect("json");
        assert_eq!(value["kind"], "seeds");
        assert_eq!(value["experiment"], "demo");
        assert_eq!(value["inputs"].as_array().map(Vec::len), Some(10));
        assert_eq!(value["config_hash"], config.stable_hash().expect("hash"));
        assert!(value["inputs"][0]["sha256"].as_str().is_some_and(|s| s.len() == 64));
    }

    #[test]
    fn missing_results_dir_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_for(&dir.path().join("nope"));
        let err = PreparedRun::load(&config).expect_err("missing dir");
        assert_eq!(err.code(), "GESP-3002");
    }
}
