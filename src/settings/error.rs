// Error types for Settings module

use std::path::PathBuf;
use thiserror::Error;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {0}: {1}")]
    ReadFailed(PathBuf, String),

    #[error("Failed to write settings file {0}: {1}")]
    WriteFailed(PathBuf, String),

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
