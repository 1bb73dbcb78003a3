// Comm module - UDP request surface for local clients

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod types;

pub use config::CommConfig;
pub use server::Comm;
#[allow(unused_imports)]
pub use types::OperationRequest;
