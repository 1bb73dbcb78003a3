// Data types for Settings module

use crate::settings::{Result, SettingsError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SSH connection settings as persisted in settings.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshSettings {
    /// Run the tool on the remote host instead of locally
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    /// Tool location relative to the login directory
    pub syshardn_path: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 22,
            username: String::new(),
            password: None,
            private_key_path: None,
            syshardn_path: "syshardn".to_string(),
        }
    }
}

impl SshSettings {
    /// Resolve the authentication method. A password wins over a key path.
    pub fn auth(&self) -> AuthMethod {
        match (non_empty(&self.password), non_empty(&self.private_key_path)) {
            (Some(password), _) => AuthMethod::Password(password.to_string()),
            (None, Some(key)) => AuthMethod::PrivateKey(PathBuf::from(key)),
            (None, None) => AuthMethod::Default,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Application settings document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub ssh: SshSettings,
    /// Local tool command; may carry leading interpreter words (e.g. "python3 main.py")
    pub local_syshardn_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh: SshSettings::default(),
            local_syshardn_path: "./syshardn".to_string(),
        }
    }
}

impl Settings {
    /// Derive the transport configuration used by the router at call time
    pub fn transport(&self) -> Result<TransportConfig> {
        if self.ssh.enabled {
            Ok(TransportConfig::Remote(RemoteTarget::try_from(&self.ssh)?))
        } else {
            if self.local_syshardn_path.trim().is_empty() {
                return Err(SettingsError::Invalid(
                    "localSyshardnPath is empty".to_string(),
                ));
            }
            Ok(TransportConfig::Local {
                tool_path: self.local_syshardn_path.clone(),
            })
        }
    }
}

/// How a remote session authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Fed to the ssh client through sshpass
    Password(String),
    /// Passed as `-i <path>`; `~` is expanded before use
    PrivateKey(PathBuf),
    /// Neither configured; ssh falls back to its agent and config
    Default,
}

impl AuthMethod {
    pub fn is_password(&self) -> bool {
        matches!(self, AuthMethod::Password(_))
    }
}

/// A reachable remote host with resolved credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub tool_path: String,
}

impl RemoteTarget {
    /// `user@host` destination string
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl TryFrom<&SshSettings> for RemoteTarget {
    type Error = SettingsError;

    fn try_from(ssh: &SshSettings) -> Result<Self> {
        if ssh.host.trim().is_empty() || ssh.username.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "SSH host and username must be configured".to_string(),
            ));
        }
        Ok(Self {
            host: ssh.host.trim().to_string(),
            port: ssh.port,
            username: ssh.username.trim().to_string(),
            auth: ssh.auth(),
            tool_path: ssh.syshardn_path.clone(),
        })
    }
}

/// Where the external tool runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Local { tool_path: String },
    Remote(RemoteTarget),
}

impl TransportConfig {
    pub fn is_remote(&self) -> bool {
        matches!(self, TransportConfig::Remote(_))
    }
}
