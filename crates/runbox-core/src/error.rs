//! Error types for runbox-core

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] runbox_config::ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] runbox_provider::ProviderError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{action} failed: {detail}")]
    EngineFailed {
        action: &'static str,
        detail: String,
    },

    #[error("Failed to start shell session: {0}")]
    SpawnFailed(String),

    #[error("Shell prompt did not appear within {}s", .0.as_secs_f32())]
    PromptTimeout(Duration),

    #[error("Shell exited before the prompt appeared: {0}")]
    SessionClosed(String),

    #[error("Session did not complete: {0}")]
    SessionIncomplete(String),

    #[error("Session worker failed: {0}")]
    WorkerFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
