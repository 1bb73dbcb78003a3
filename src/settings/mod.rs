// Settings module - persisted transport configuration
// Loaded once at startup, rewritten wholesale on save

pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, SettingsError};
pub use store::SettingsStore;
#[allow(unused_imports)]
pub use types::{AuthMethod, RemoteTarget, Settings, SshSettings, TransportConfig};
