// Error types for Executor module

use thiserror::Error;

/// Executor error types
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Executable missing or not runnable; never retried
    #[error("Failed to spawn '{0}': {1}")]
    SpawnFailure(String, String),

    /// Bad credentials, unreachable host, or a missing auth helper
    #[error("{0}")]
    TransportAuthFailure(String),

    /// Exit code outside the tool's success set
    #[error("{message}")]
    NonZeroExit { code: Option<i32>, message: String },

    #[error("Failed to capture output of '{0}': {1}")]
    OutputCaptureFailed(String, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Stderr becomes the message; an empty stderr falls back to the code
    pub fn non_zero_exit(code: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let message = if !stderr.is_empty() {
            stderr.to_string()
        } else {
            match code {
                Some(code) => format!("Command failed with exit code {}", code),
                None => "Command terminated by signal".to_string(),
            }
        };
        ExecutorError::NonZeroExit { code, message }
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
