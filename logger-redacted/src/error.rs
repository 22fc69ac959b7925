use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid redaction pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),

    #[error("A different PHI redactor is already in use; initialize logging before redacting any text")]
    RedactorConflict,
}

pub type LoggerResult<T> = Result<T, LoggerError>;
