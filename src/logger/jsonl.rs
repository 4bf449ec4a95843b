//! Activity log: append-only JSON lines, one self-contained object per event.
//!
//! Each line is serialized in full before it is written with a single
//! `write_all`, so a reader tailing the file never sees a partial object.
//!
//! When the primary file cannot be opened or written, the writer steps down:
//! primary path, then fallback path, then stderr (prefixed `[GESP-JSONL]`),
//! then silent discard. Logging never fails an analysis.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::PathsConfig;
use crate::core::errors::{GespError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Analysis lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AnalysisStart,
    SeedsDiscarded,
    SweepPointSkipped,
    AnalysisComplete,
    SimulateComplete,
    Error,
}

/// One log line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Subcommand that produced the event (`grace`, `timeline`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds_retained: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds_discarded: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_cutoff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Input directory or output file involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: utc_now_rfc3339(),
            event,
            severity,
            command: None,
            experiment: None,
            seed: None,
            seeds_retained: None,
            seeds_discarded: None,
            grace: None,
            time_cutoff: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            path: None,
            details: None,
        }
    }

    /// Error entry carrying the error's code and message.
    #[must_use]
    pub fn from_error(err: &GespError) -> Self {
        let mut entry = Self::new(EventType::Error, Severity::Error);
        entry.ok = Some(false);
        entry.error_code = Some(err.code().to_string());
        entry.error_message = Some(err.to_string());
        entry
    }

    #[must_use]
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    #[must_use]
    pub fn with_experiment(mut self, experiment: &str) -> Self {
        self.experiment = Some(experiment.to_string());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would grow past this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1` .. `<path>.N`.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    #[must_use]
    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self {
            path: paths.jsonl_log.clone(),
            fallback_path: paths.jsonl_fallback.clone(),
            ..Self::default()
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        let paths = PathsConfig::default();
        Self {
            path: paths.jsonl_log,
            fallback_path: paths.jsonl_fallback,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Append-only JSONL writer with size rotation and a fallback chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
}

impl std::fmt::Debug for JsonlWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlWriter")
            .field("path", &self.config.path)
            .field("sink", &self.sink)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl JsonlWriter {
    /// Open the log, stepping down the fallback chain as needed.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            writer: None,
            sink: Sink::Discard,
            bytes_written: 0,
        };
        writer.open_primary();
        writer
    }

    /// Writer that drops everything; used when logging is disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            config: JsonlConfig {
                path: PathBuf::new(),
                fallback_path: None,
                max_size_bytes: u64::MAX,
                max_rotated_files: 0,
            },
            writer: None,
            sink: Sink::Discard,
            bytes_written: 0,
        }
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[GESP-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Where lines currently go: `primary`, `fallback`, `stderr` or `discard`.
    #[must_use]
    pub fn state(&self) -> &'static str {
        match self.sink {
            Sink::Primary => "primary",
            Sink::Fallback => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if matches!(self.sink, Sink::Primary | Sink::Fallback)
            && self.bytes_written > 0
            && self.bytes_written + len > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.sink {
            Sink::Primary | Sink::Fallback => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += len;
                } else {
                    self.step_down();
                    self.write_line(line);
                }
            }
            Sink::Stderr => {
                let _ = write!(io::stderr(), "[GESP-JSONL] {line}");
            }
            Sink::Discard => {}
        }
    }

    fn open_primary(&mut self) {
        if let Ok((file, size)) = open_append(&self.config.path) {
            self.use_file(file, size, Sink::Primary);
        } else {
            self.open_fallback();
        }
    }

    fn open_fallback(&mut self) {
        let opened = self
            .config
            .fallback_path
            .as_deref()
            .and_then(|path| open_append(path).ok().map(|ok| (ok, path.display().to_string())));
        match opened {
            Some(((file, size), shown)) => {
                let _ = writeln!(io::stderr(), "[GESP-JSONL] primary log unavailable, using {shown}");
                self.use_file(file, size, Sink::Fallback);
            }
            None => {
                let _ = writeln!(io::stderr(), "[GESP-JSONL] no writable log file, using stderr");
                self.writer = None;
                self.sink = Sink::Stderr;
            }
        }
    }

    fn use_file(&mut self, file: File, size: u64, sink: Sink) {
        self.writer = Some(BufWriter::new(file));
        self.bytes_written = size;
        self.sink = sink;
    }

    fn step_down(&mut self) {
        self.writer = None;
        match self.sink {
            Sink::Primary => self.open_fallback(),
            Sink::Fallback => self.sink = Sink::Stderr,
            Sink::Stderr | Sink::Discard => self.sink = Sink::Discard,
        }
    }

    fn current_path(&self) -> Option<PathBuf> {
        match self.sink {
            Sink::Primary => Some(self.config.path.clone()),
            Sink::Fallback => self.config.fallback_path.clone(),
            Sink::Stderr | Sink::Discard => None,
        }
    }

    fn rotate(&mut self) {
        let Some(base) = self.current_path() else {
            return;
        };
        self.flush();
        self.writer = None;

        // <base>.N is dropped, every older generation moves up by one.
        let keep = self.config.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for index in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
        }
        if keep > 0 {
            let _ = fs::rename(&base, rotated_name(&base, 1));
        } else {
            let _ = fs::remove_file(&base);
        }

        match open_append(&base) {
            Ok((file, size)) => {
                let sink = self.sink;
                self.use_file(file, size, sink);
            }
            Err(_) => self.step_down(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Open (creating parents) for append; returns the file and its current size.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| GespError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| GespError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn utc_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: PathBuf) -> JsonlConfig {
        JsonlConfig {
            path,
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 2,
        }
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .expect("read log")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[test]
    fn entries_are_one_json_object_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("activity.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));
        assert_eq!(writer.state(), "primary");

        let mut start = LogEntry::new(EventType::AnalysisStart, Severity::Info)
            .with_command("grace")
            .with_experiment("veenstra");
        start.grace = Some(0.25);
        writer.write_entry(&start);
        writer.write_entry(&LogEntry::new(EventType::AnalysisComplete, Severity::Info));
        writer.flush();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "analysis_start");
        assert_eq!(lines[0]["command"], "grace");
        assert_eq!(lines[0]["grace"], 0.25);
        assert_eq!(lines[1]["event"], "analysis_complete");
        // Unset optional fields are omitted.
        assert!(lines[1].get("seed").is_none());
        assert!(lines[1].get("error_code").is_none());
    }

    #[test]
    fn error_entries_carry_code() {
        let err = GespError::GraceOutOfRange { value: 2.0 };
        let entry = LogEntry::from_error(&err);
        assert_eq!(entry.event, EventType::Error);
        assert_eq!(entry.error_code.as_deref(), Some("GESP-2004"));
        assert_eq!(entry.ok, Some(false));
    }

    #[test]
    fn rotation_keeps_bounded_generations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rot.jsonl");
        let mut writer = JsonlWriter::open(JsonlConfig {
            max_size_bytes: 120,
            ..config(path.clone())
        });
        for _ in 0..12 {
            writer.write_entry(&LogEntry::new(EventType::SweepPointSkipped, Severity::Warning));
        }
        writer.flush();

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(rotated_name(&path, 2).exists());
        assert!(!rotated_name(&path, 3).exists());
    }

    #[test]
    fn falls_back_when_primary_unwritable() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file cannot be used as a parent directory.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").expect("blocker");
        let fallback = dir.path().join("fallback.jsonl");
        let mut writer = JsonlWriter::open(JsonlConfig {
            fallback_path: Some(fallback.clone()),
            ..config(blocker.join("primary.jsonl"))
        });

        assert_eq!(writer.state(), "fallback");
        writer.write_entry(&LogEntry::new(EventType::Error, Severity::Error));
        writer.flush();
        assert_eq!(read_lines(&fallback).len(), 1);
    }

    #[test]
    fn no_file_available_goes_to_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").expect("blocker");
        let writer = JsonlWriter::open(config(blocker.join("primary.jsonl")));
        assert_eq!(writer.state(), "stderr");
    }

    #[test]
    fn disabled_writer_discards() {
        let mut writer = JsonlWriter::disabled();
        writer.write_entry(&LogEntry::new(EventType::AnalysisStart, Severity::Info));
        assert_eq!(writer.state(), "discard");
        assert_eq!(writer.bytes_written(), 0);
    }
}
