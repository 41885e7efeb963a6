//! Error types for the engine command runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Container engine not available: {0}")]
    EngineUnavailable(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
