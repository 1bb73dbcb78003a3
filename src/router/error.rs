// Router errors

use crate::executor::ExecutorError;
use crate::retriever::RetrievalError;
use crate::settings::SettingsError;
use thiserror::Error;

/// Router errors; all of them end up in a failed envelope
#[derive(Debug, Error)]
pub enum RouterError {
    /// First-class rejection from the execution guard
    #[error("{0} already in progress")]
    OperationInProgress(&'static str),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Stdout held no usable JSON; the raw text goes back to the caller
    #[error("{error}")]
    Unparsed { error: RetrievalError, stdout: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
