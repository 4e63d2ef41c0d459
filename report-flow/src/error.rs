use std::time::Duration;
use thiserror::Error;

/// Errors raised while building, generating or relaying a report.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Generation backend error: {0}")]
    Backend(String),

    #[error("Malformed stream chunk: {0}")]
    MalformedChunk(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
