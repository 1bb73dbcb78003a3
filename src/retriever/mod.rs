// Retriever module - recovers the tool's JSON report after a run
// Named artifact, then case-insensitive neighbor, then stdout

pub mod chain;
pub mod error;
pub mod extract;
pub mod policy;
pub mod store;

pub use chain::{RetrievalStage, Retrieved, Retriever};
pub use error::{Result, RetrievalError};
pub use policy::RetryPolicy;
pub use store::{ArtifactStore, LocalArtifactStore, RemoteArtifactStore};
