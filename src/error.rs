use std::path::PathBuf;

use _model::Stage;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("similarity threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("{name} must be a positive distance in metres, got {value}")]
    NegativeDistance { name: &'static str, value: f64 },
    #[error("{name} weight must be a finite non-negative number, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("at least one similarity weight must be positive")]
    ZeroWeights,
    #[error("stage {0} is listed twice in the precedence order")]
    DuplicateStage(Stage),
    #[error("geo grid cell size must be positive, got {0}")]
    ZeroCellSize(f64),
}

/// A record that cannot be matched against anything.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed record from {source_tag}: {reason}")]
pub struct MalformedRecord {
    pub source_tag: String,
    pub reason: &'static str,
}

/// An input document that could not be read or parsed.
#[derive(Debug, Error)]
#[error("source {} unavailable: {reason:#}", .path.display())]
pub struct SourceUnavailable {
    pub path: PathBuf,
    pub reason: anyhow::Error,
}
