
use thiserror::Error;

/// The error taxonomy of the engine. Usage and schema errors are fatal and
/// never retried. A row-not-found error signals that an in-memory entity is
/// stale relative to the store. Access errors carry the underlying driver
/// message unchanged.
#[derive(Error, Debug)]
pub enum LimberError {
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Row not found: no {kind} row matches the key {key}")]
    RowNotFound { kind: String, key: String },
    #[error("Access error: {0}")]
    Access(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LimberError>;
