// Executor module - transport backends for the external tool
// Local runs a true argv; remote runs one command line over ssh

pub mod config;
pub mod error;
pub mod local;
pub mod remote;
pub mod stream;
pub mod types;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, Result};
pub use local::LocalExecutor;
pub use remote::RemoteExecutor;
pub use types::ExecutionResult;
