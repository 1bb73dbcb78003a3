// Daemon configuration: defaults, optional TOML file, env overrides

use crate::comm::CommConfig;
use crate::executor::ExecutorConfig;
use crate::retriever::RetryPolicy;
use crate::router::RouterPaths;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "syshardn-orchestrator";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(PathBuf, String),

    #[error("Invalid config file {0}: {1}")]
    Parse(PathBuf, String),
}

/// Everything the daemon needs at startup
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub data_dir: PathBuf,
    /// Persisted user settings (JSON)
    pub settings_path: PathBuf,
    pub remote_scratch_dir: String,
    pub download_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub retry: RetryPolicy,
    pub executor: ExecutorConfig,
    pub comm: CommConfig,
    pub log_level: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

/// Optional on-disk overrides; every key may be omitted
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub data_dir: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub remote_scratch_dir: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub backups_dir: Option<PathBuf>,
    pub retry_delay_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub log_level: Option<String>,
    pub listen_addr: Option<String>,
    pub listen_port: Option<u16>,
    pub response_timeout_secs: Option<u64>,
    pub ssh_program: Option<String>,
    pub sshpass_program: Option<String>,
    pub scp_program: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
            .map(Some)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}

/// Parse an environment variable, logging a warning if the value is present but invalid.
fn parse_env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %v, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

impl OrchestratorConfig {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            settings_path: data_dir.join("settings.json"),
            download_dir: dirs::download_dir().unwrap_or_else(|| data_dir.clone()),
            comm: CommConfig {
                spill_dir: data_dir.join("responses"),
                ..CommConfig::default()
            },
            data_dir,
            remote_scratch_dir: "/tmp".to_string(),
            backups_dir: PathBuf::from("backups"),
            retry: RetryPolicy::for_platform(),
            executor: ExecutorConfig::default(),
            log_level: "info".to_string(),
        }
    }

    /// Load from `.env`, the TOML file, then environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let data_dir = std::env::var("SYSHARDN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        let config_path = std::env::var("SYSHARDN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("orchestrator.toml"));

        let mut config = Self::with_data_dir(data_dir);
        if let Some(file) = ConfigFile::load(&config_path)? {
            config.apply_file(file);
        }
        config.apply_env();
        Ok(config)
    }

    /// Keys present in `file` replace the current values
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(data_dir) = file.data_dir {
            // Derived paths follow the data dir unless set explicitly
            if self.settings_path == self.data_dir.join("settings.json") {
                self.settings_path = data_dir.join("settings.json");
            }
            if self.comm.spill_dir == self.data_dir.join("responses") {
                self.comm.spill_dir = data_dir.join("responses");
            }
            self.data_dir = data_dir;
        }
        if let Some(v) = file.settings_path {
            self.settings_path = v;
        }
        if let Some(v) = file.remote_scratch_dir {
            self.remote_scratch_dir = v;
        }
        if let Some(v) = file.download_dir {
            self.download_dir = v;
        }
        if let Some(v) = file.backups_dir {
            self.backups_dir = v;
        }
        if let Some(ms) = file.retry_delay_ms {
            self.retry.delay = Duration::from_millis(ms);
        }
        if let Some(v) = file.retry_attempts {
            self.retry.max_attempts = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.listen_addr {
            self.comm.listen_addr = v;
        }
        if let Some(v) = file.listen_port {
            self.comm.listen_port = v;
        }
        if let Some(v) = file.response_timeout_secs {
            self.comm.response_timeout_secs = v;
        }
        if let Some(v) = file.ssh_program {
            self.executor.ssh_program = v;
        }
        if let Some(v) = file.sshpass_program {
            self.executor.sshpass_program = v;
        }
        if let Some(v) = file.scp_program {
            self.executor.scp_program = v;
        }
        if let Some(v) = file.connect_timeout_secs {
            self.executor.connect_timeout_secs = v;
        }
    }

    fn apply_env(&mut self) {
        self.comm.listen_addr = parse_env_var("SYSHARDN_LISTEN_ADDR", self.comm.listen_addr.clone());
        self.comm.listen_port = parse_env_var("SYSHARDN_LISTEN_PORT", self.comm.listen_port);
        self.comm.response_timeout_secs =
            parse_env_var("SYSHARDN_RESPONSE_TIMEOUT_SECS", self.comm.response_timeout_secs);

        let delay_ms = parse_env_var("SYSHARDN_RETRY_DELAY_MS", self.retry.delay.as_millis() as u64);
        self.retry.delay = Duration::from_millis(delay_ms);
        self.retry.max_attempts = parse_env_var("SYSHARDN_RETRY_ATTEMPTS", self.retry.max_attempts);

        self.log_level = parse_env_var("SYSHARDN_LOG_LEVEL", self.log_level.clone());
    }

    pub fn router_paths(&self) -> RouterPaths {
        RouterPaths {
            data_dir: self.data_dir.clone(),
            remote_scratch_dir: self.remote_scratch_dir.clone(),
            download_dir: self.download_dir.clone(),
            backups_dir: self.backups_dir.clone(),
        }
    }
}
