// Error types for Retriever module

use std::path::PathBuf;
use thiserror::Error;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The artifact never appeared and stdout held no JSON object
    #[error("Report file not found at {} and no JSON in stdout", .path.display())]
    ArtifactUnavailable { path: PathBuf },

    /// An artifact or stdout fragment was found but did not parse
    #[error("Malformed report payload in {origin}: {reason}")]
    MalformedPayload { origin: String, reason: String },

    /// No artifact was declared and stdout held no JSON
    #[error("No JSON output found in command output")]
    NoJsonOutput,

    #[error("Artifact store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
