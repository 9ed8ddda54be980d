//! Error types for configuration, tables, sessions and recording.

use std::path::PathBuf;

use thiserror::Error;

/// Experiment configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for `ExperimentConfig`
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A parameter is outside its valid range
    #[error("Invalid config parameter {parameter}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
}

/// Target/session table errors
#[derive(Error, Debug)]
pub enum TableError {
    /// Participant folder is unset or missing
    #[error("Participant folder not available: {0}")]
    MissingFolder(PathBuf),

    /// No `<prefix>*.csv` in the participant folder
    #[error("No {prefix}*.csv found in {folder}")]
    NotFound { prefix: &'static str, folder: PathBuf },

    /// Nothing to write
    #[error("No {0} to save")]
    Empty(&'static str),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Session construction errors
#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("No targets defined")]
    NoTargets,

    #[error("No trials defined")]
    NoTrials,

    /// Every session row was skipped during the merge
    #[error("No valid trials remained after merging ({skipped} skipped)")]
    NoValidTrials { skipped: usize },
}

/// Trial recording errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// `end_and_save` without a preceding `begin`
    #[error("Recorder is not recording")]
    NotRecording,
}

pub type TableResult<T> = Result<T, TableError>;
pub type RecorderResult<T> = Result<T, RecorderError>;
