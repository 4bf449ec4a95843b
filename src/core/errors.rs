//! GESP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, GespError>;

/// Top-level error type for the GESP analysis crate.
#[derive(Debug, Error)]
pub enum GespError {
    #[error("[GESP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[GESP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[GESP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[GESP-2001] result log parse failure in {path} line {line}: {details}")]
    LogParse {
        path: PathBuf,
        line: usize,
        details: String,
    },

    #[error("[GESP-2002] data invariant violated for seed {seed}: {details}")]
    DataInvariant { seed: u64, details: String },

    #[error("[GESP-2003] trajectory length changed: expected {expected} steps, got {actual}")]
    TrajectoryLength { expected: usize, actual: usize },

    #[error("[GESP-2004] grace proportion must be in [0, 1], got {value}")]
    GraceOutOfRange { value: f64 },

    #[error("[GESP-2005] insufficient data: {details}")]
    InsufficientData { details: String },

    #[error("[GESP-2006] no comparable point on the unstopped fitness curve at step {step}")]
    EmptyCurve { step: u64 },

    #[error("[GESP-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[GESP-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[GESP-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl GespError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "GESP-1001",
            Self::MissingConfig { .. } => "GESP-1002",
            Self::ConfigParse { .. } => "GESP-1003",
            Self::LogParse { .. } => "GESP-2001",
            Self::DataInvariant { .. } => "GESP-2002",
            Self::TrajectoryLength { .. } => "GESP-2003",
            Self::GraceOutOfRange { .. } => "GESP-2004",
            Self::InsufficientData { .. } => "GESP-2005",
            Self::EmptyCurve { .. } => "GESP-2006",
            Self::Serialization { .. } => "GESP-2101",
            Self::Io { .. } => "GESP-3002",
            Self::Runtime { .. } => "GESP-3900",
        }
    }

    /// Whether the error is a broken analysis contract (bad input data or a
    /// misuse of the engine) rather than an environment failure.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::DataInvariant { .. }
                | Self::TrajectoryLength { .. }
                | Self::GraceOutOfRange { .. }
                | Self::InsufficientData { .. }
                | Self::EmptyCurve { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for GespError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GespError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for GespError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<GespError> {
        vec![
            GespError::InvalidConfig {
                details: String::new(),
            },
            GespError::MissingConfig {
                path: PathBuf::new(),
            },
            GespError::ConfigParse {
                context: "",
                details: String::new(),
            },
            GespError::LogParse {
                path: PathBuf::new(),
                line: 0,
                details: String::new(),
            },
            GespError::DataInvariant {
                seed: 0,
                details: String::new(),
            },
            GespError::TrajectoryLength {
                expected: 0,
                actual: 0,
            },
            GespError::GraceOutOfRange { value: 0.0 },
            GespError::InsufficientData {
                details: String::new(),
            },
            GespError::EmptyCurve { step: 0 },
            GespError::Serialization {
                context: "",
                details: String::new(),
            },
            GespError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            GespError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(GespError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_carries_code_prefix() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.starts_with(&format!("[{}]", err.code())),
                "display should start with its code: {msg}"
            );
        }
    }

    #[test]
    fn contract_violations_are_classified() {
        assert!(GespError::GraceOutOfRange { value: 1.5 }.is_contract_violation());
        assert!(
            GespError::TrajectoryLength {
                expected: 5,
                actual: 4
            }
            .is_contract_violation()
        );
        assert!(GespError::EmptyCurve { step: 10 }.is_contract_violation());
        assert!(
            !GespError::InvalidConfig {
                details: String::new()
            }
            .is_contract_violation()
        );
        assert!(
            !GespError::io("/tmp/x", std::io::Error::other("gone")).is_contract_violation()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = GespError::io(
            "/tmp/results/run_3.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "GESP-3002");
        assert!(err.to_string().contains("/tmp/results/run_3.txt"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: GespError = json_err.into();
        assert_eq!(err.code(), "GESP-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: GespError = toml_err.into();
        assert_eq!(err.code(), "GESP-1003");
    }
}
