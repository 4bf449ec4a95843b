//! Result-log reader: discovers per-seed log files and parses them into a [`RunTable`].
//!
//! Each seed writes one CSV file named `<experiment>…_<seed>.<ext>`. The first
//! line is a header (`time,0,1,…`), every following line is one episode:
//! the elapsed wall-clock time followed by the per-step fitness values.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::errors::{GespError, Result};
use crate::data::table::{EpisodeRecord, RunTable, SeedId};

/// Provenance of one loaded result file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFile {
    pub seed: SeedId,
    pub path: PathBuf,
    pub episodes: usize,
    pub sha256: String,
}

/// Combined table plus the files it came from.
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub table: RunTable,
    pub inputs: Vec<InputFile>,
}

/// Find every result file for `experiment` in `dir`, sorted by seed.
pub fn discover_result_files(
    dir: &Path,
    experiment: &str,
    extension: &str,
) -> Result<Vec<(SeedId, PathBuf)>> {
    let pattern = format!(r"_(\d+)\.{}$", regex::escape(extension));
    let seed_re = Regex::new(&pattern).map_err(|e| GespError::InvalidConfig {
        details: format!("file extension {extension:?} does not form a valid pattern: {e}"),
    })?;

    let entries = fs::read_dir(dir).map_err(|source| GespError::io(dir, source))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| GespError::io(dir, source))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.starts_with(experiment) {
            continue;
        }
        let Some(captures) = seed_re.captures(name) else {
            continue;
        };
        let Ok(seed) = captures[1].parse::<SeedId>() else {
            continue;
        };
        found.push((seed, entry.path()));
    }

    found.sort_by_key(|(seed, _)| *seed);
    if let Some(pair) = found.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(GespError::DataInvariant {
            seed: pair[0].0,
            details: format!(
                "seed appears in two result files: {} and {}",
                pair[0].1.display(),
                pair[1].1.display()
            ),
        });
    }
    Ok(found)
}

/// Load all result files of one experiment into a combined table.
pub fn load_result_dir(dir: &Path, experiment: &str, extension: &str) -> Result<LoadedRun> {
    let files = discover_result_files(dir, experiment, extension)?;
    if files.is_empty() {
        return Err(GespError::InsufficientData {
            details: format!(
                "no result files matching {experiment}*_<seed>.{extension} in {}",
                dir.display()
            ),
        });
    }

    let mut table = RunTable::new();
    let mut inputs = Vec::with_capacity(files.len());
    for (seed, path) in files {
        let bytes = fs::read(&path).map_err(|source| GespError::io(&path, source))?;
        let rows = parse_result_log(&bytes, &path)?;
        let episodes = rows.len();
        for (elapsed_time, trajectory) in rows {
            table.push(EpisodeRecord::new(seed, elapsed_time, trajectory))?;
        }
        inputs.push(InputFile {
            seed,
            path,
            episodes,
            sha256: sha256_hex(&bytes),
        });
    }

    Ok(LoadedRun { table, inputs })
}

/// Parse one result log into `(elapsed_time, trajectory)` rows.
///
/// `path` is only used to label errors.
pub fn parse_result_log(bytes: &[u8], path: &Path) -> Result<Vec<(f64, Vec<f64>)>> {
    let parse_err = |line: usize, details: String| GespError::LogParse {
        path: path.to_path_buf(),
        line,
        details,
    };

    let mut rows = Vec::new();
    let mut columns: Option<usize> = None;
    let mut start = 0;
    let line_ends = memchr::memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
    for (index, end) in line_ends.enumerate() {
        let line_no = index + 1;
        let raw = &bytes[start..end];
        start = (end + 1).min(bytes.len());

        let text = std::str::from_utf8(raw)
            .map_err(|e| parse_err(line_no, format!("invalid UTF-8: {e}")))?
            .trim();
        if text.is_empty() {
            continue;
        }

        let Some(expected) = columns else {
            let header: Vec<&str> = text.split(',').map(str::trim).collect();
            if header.first() != Some(&"time") {
                return Err(parse_err(
                    line_no,
                    format!("header must start with `time`, got {text:?}"),
                ));
            }
            if header.len() < 2 {
                return Err(parse_err(line_no, "header lists no fitness columns".to_string()));
            }
            columns = Some(header.len());
            continue;
        };

        let mut values = Vec::with_capacity(expected);
        for (column, field) in text.split(',').map(str::trim).enumerate() {
            let value = field.parse::<f64>().map_err(|e| {
                parse_err(line_no, format!("column {column}: {field:?} is not a number: {e}"))
            })?;
            values.push(value);
        }
        if values.len() != expected {
            return Err(parse_err(
                line_no,
                format!("expected {expected} columns, found {}", values.len()),
            ));
        }
        let elapsed = values.remove(0);
        rows.push((elapsed, values));
    }

    if columns.is_none() {
        return Err(parse_err(1, "file has no header".to_string()));
    }
    Ok(rows)
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let log = b"time,0,1,2\n1.5,0.1,0.2,0.3\n3.0,0.0,0.5,1.0\n";
        let rows = parse_result_log(log, Path::new("mem.txt")).expect("parse");
        assert_eq!(rows.len(), 2);
        assert!((rows[0].0 - 1.5).abs() < f64::EPSILON);
        assert_eq!(rows[1].1, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn tolerates_crlf_and_blank_lines() {
        let log = b"time,0,1\r\n\r\n2,1,2\r\n";
        let rows = parse_result_log(log, Path::new("mem.txt")).expect("parse");
        assert_eq!(rows, vec![(2.0, vec![1.0, 2.0])]);
    }

    #[test]
    fn reports_line_of_bad_number() {
        let log = b"time,0,1\n1,2,3\n2,x,3\n";
        let err = parse_result_log(log, Path::new("bad.txt")).expect_err("bad number");
        match err {
            GespError::LogParse { line, path, .. } => {
                assert_eq!(line, 3);
                assert_eq!(path, PathBuf::from("bad.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_ragged_rows_and_missing_header() {
        assert!(parse_result_log(b"time,0,1\n1,2\n", Path::new("r.txt")).is_err());
        assert!(parse_result_log(b"1,2,3\n", Path::new("h.txt")).is_err());
        assert!(parse_result_log(b"", Path::new("e.txt")).is_err());
    }

    #[test]
    fn discovers_files_by_prefix_and_seed_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "veenstra_result_10.txt",
            "veenstra_result_2.txt",
            "veenstra_result_x.txt",
            "other_result_3.txt",
            "veenstra_result_4.csv",
        ] {
            fs::write(dir.path().join(name), "time,0\n1,1\n").expect("write");
        }

        let files = discover_result_files(dir.path(), "veenstra", "txt").expect("discover");
        let seeds: Vec<SeedId> = files.iter().map(|(seed, _)| *seed).collect();
        assert_eq!(seeds, vec![2, 10]);
    }

    #[test]
    fn load_combines_seeds_and_records_digests() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("exp_run_1.txt"),
            "time,0,1\n1,0,1\n2,1,2\n",
        )
        .expect("write");
        fs::write(dir.path().join("exp_run_2.txt"), "time,0,1\n5,3,4\n").expect("write");

        let loaded = load_result_dir(dir.path(), "exp", "txt").expect("load");
        assert_eq!(loaded.table.seed_ids(), vec![1, 2]);
        assert_eq!(loaded.table.episode_count(), 3);
        assert_eq!(loaded.inputs.len(), 2);
        assert_eq!(loaded.inputs[0].episodes, 2);
        assert_eq!(loaded.inputs[0].sha256.len(), 64);
        assert_ne!(loaded.inputs[0].sha256, loaded.inputs[1].sha256);
    }

    #[test]
    fn load_fails_when_nothing_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_result_dir(dir.path(), "exp", "txt").expect_err("empty dir");
        assert_eq!(err.code(), "GESP-2005");
    }
}
