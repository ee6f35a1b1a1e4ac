//! Error types for Despejar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown dataset type: {0}")]
    UnknownDataset(String),

    #[error("Unknown network architecture: {0}")]
    UnknownArch(String),

    #[error("Unknown metric type: {0}")]
    UnknownMetric(String),

    #[error("Unsupported optimizer: {0}")]
    UnsupportedOptimizer(String),

    #[error("Unsupported scheduler: {0}")]
    UnsupportedScheduler(String),

    #[error("Invalid dataloader phase: {0}")]
    InvalidPhase(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("State dict mismatch: {0}")]
    StateDictMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
