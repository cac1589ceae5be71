use crate::experiment::TrialId;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the curation core can report.
///
/// Load-time variants (`Schema`, `Unit`, `Config`, `Io`, `Csv`, `Json`) abort loading
/// the experiment. The rest are per-operation and leave the session untouched.
#[derive(Debug, Error)]
pub enum CurateError {
    #[error("schema error in column '{column}': {message}")]
    Schema { column: String, message: String },
    #[error("unit error in column '{column}': unrecognized unit '{unit}'")]
    Unit { column: String, unit: String },
    #[error("config error for key '{key}': {message}")]
    Config { key: String, message: String },
    #[error("invalid window: start {p1} ms is after end {p2} ms")]
    InvalidWindow { p1: f64, p2: f64 },
    #[error("trial {0} is neither accepted nor rejected")]
    NotResolved(TrialId),
    #[error("no trial is active")]
    NoActiveTrial,
    #[error("trial {0} does not exist in this experiment")]
    UnknownTrial(TrialId),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CurateError>;

impl CurateError {
    pub(crate) fn schema(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            message: message.into(),
        }
    }

    pub(crate) fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
