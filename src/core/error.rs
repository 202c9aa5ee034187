use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FailsafeError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid git hash format: expected 40 or 64 hex chars (got {0:?})")]
    InvalidHashFormat(String),
    #[error("git error: {0}")]
    Git(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}
