// Router module - turns logical operations into tool invocations
// Picks the backend per call from the current settings snapshot

pub mod error;
pub mod probe;
pub mod request;
pub mod service;

pub use error::RouterError;
#[allow(unused_imports)]
pub use request::{ExecutionRequest, Subcommand};
pub use service::{CommandRouter, RouterPaths};
