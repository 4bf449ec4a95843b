//! Result-log writer: the producer side of the format read by [`crate::data::loader`].

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{GespError, Result};

/// Appends one CSV row per evaluated episode: elapsed time, then fitness values.
///
/// Only every `log_every`-th fitness value is written; the header is emitted
/// with the first row so its column count always matches the data. Every
/// later row must carry as many values as the first.
pub struct TrajectoryLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    log_every: usize,
    row_len: Option<usize>,
    rows: usize,
}

impl TrajectoryLogger {
    /// Create the log file.
    ///
    /// An existing file is an error unless `replace_existing` is set.
    pub fn create(path: &Path, replace_existing: bool, log_every: usize) -> Result<Self> {
        if log_every == 0 {
            return Err(GespError::InvalidConfig {
                details: "log_every must be >= 1".to_string(),
            });
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| GespError::io(parent, source))?;
        }
        if path.exists() {
            if replace_existing {
                fs::remove_file(path).map_err(|source| GespError::io(path, source))?;
            } else {
                return Err(GespError::io(
                    path,
                    io::Error::new(io::ErrorKind::AlreadyExists, "result log already exists"),
                ));
            }
        }

        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .map_err(|source| GespError::io(path, source))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            log_every,
            row_len: None,
            rows: 0,
        })
    }

    /// Append one episode.
    pub fn log_values(&mut self, elapsed_time: f64, values: &[f64]) -> Result<()> {
        if values.is_empty() {
            return Err(GespError::InsufficientData {
                details: format!("empty trajectory for {}", self.path.display()),
            });
        }
        if let Some(expected) = self.row_len
            && expected != values.len()
        {
            return Err(GespError::TrajectoryLength {
                expected,
                actual: values.len(),
            });
        }

        let kept: Vec<f64> = values.iter().copied().step_by(self.log_every).collect();

        if self.row_len.is_none() {
            let mut header = String::from("time");
            for column in 0..kept.len() {
                header.push(',');
                header.push_str(&column.to_string());
            }
            writeln!(self.writer, "{header}").map_err(|source| GespError::io(&self.path, source))?;
            self.row_len = Some(values.len());
        }

        let mut line = elapsed_time.to_string();
        for value in kept {
            line.push(',');
            line.push_str(&value.to_string());
        }
        writeln!(self.writer, "{line}").map_err(|source| GespError::io(&self.path, source))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and close the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer
            .flush()
            .map_err(|source| GespError::io(&self.path, source))?;
        Ok(self.path)
    }
}
