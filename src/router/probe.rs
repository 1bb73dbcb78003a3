// Host probes: system summary and rollback backup listing

use crate::envelope::ResultEnvelope;
use crate::executor::remote::quote_arg;
use crate::router::CommandRouter;
use crate::settings::{RemoteTarget, TransportConfig};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

const NOT_AVAILABLE: &str = "N/A";

const PROBE_COMMANDS: [&str; 5] = [
    "uname -sr",
    "hostname",
    "uptime -p 2>/dev/null || echo \"N/A\"",
    "free -h 2>/dev/null | grep Mem | awk '{print $2}' || echo \"N/A\"",
    "df -h / 2>/dev/null | tail -1 | awk '{print $2}' || echo \"N/A\"",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os: String,
    pub hostname: String,
    pub uptime: String,
    pub memory: String,
    pub disk: String,
    pub is_remote: bool,
}

impl SystemInfo {
    /// Build from probe outputs in `PROBE_COMMANDS` order
    fn from_outputs(outputs: Vec<Option<String>>, is_remote: bool) -> Self {
        let mut values = outputs.into_iter().map(|out| {
            out.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        });
        let mut next = || values.next().unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let os = next();
        let hostname = next();
        let uptime = next().replacen("up ", "", 1);
        let memory = next();
        let disk = next();

        Self {
            os,
            hostname,
            uptime,
            memory,
            disk,
            is_remote,
        }
    }
}

/// A rollback backup file written by the tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub id: String,
    pub rule_id: String,
    pub timestamp: String,
    pub display_name: String,
}

impl BackupEntry {
    /// `<ruleId>_<timestamp>.json`; the timestamp may itself contain underscores
    fn from_file_name(file: &str) -> Option<Self> {
        let base = file.rsplit('/').next()?.strip_suffix(".json")?;
        if base.is_empty() {
            return None;
        }
        let (rule_id, timestamp) = base.split_once('_').unwrap_or((base, ""));
        Some(Self {
            id: base.to_string(),
            rule_id: rule_id.to_string(),
            timestamp: timestamp.to_string(),
            display_name: format!("{} - {}", rule_id, timestamp),
        })
    }
}

/// Newest first
pub fn parse_backup_entries<'a>(files: impl IntoIterator<Item = &'a str>) -> Vec<BackupEntry> {
    let mut entries: Vec<BackupEntry> = files
        .into_iter()
        .map(str::trim)
        .filter_map(BackupEntry::from_file_name)
        .collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

impl CommandRouter {
    /// OS, hostname, uptime, memory and disk of the host the tool runs on
    pub async fn system_info(&self) -> ResultEnvelope {
        if let Ok(TransportConfig::Remote(target)) = self.transport() {
            match self.remote_system_info(&target).await {
                Some(info) => return to_envelope(&info),
                None => warn!(host = %target.host, "failed to get remote system info, using local"),
            }
        }
        to_envelope(&self.local_system_info().await)
    }

    async fn remote_system_info(&self, target: &RemoteTarget) -> Option<SystemInfo> {
        let executor = self.remote_executor();
        let results = join_all(
            PROBE_COMMANDS
                .iter()
                .map(|command| executor.run(command, target)),
        )
        .await;

        // Every probe failing at transport level means the host is unreachable
        if results.iter().all(|r| r.is_err()) {
            return None;
        }

        let outputs = results
            .into_iter()
            .map(|r| r.ok().filter(|r| r.success).map(|r| r.stdout))
            .collect();
        Some(SystemInfo::from_outputs(outputs, true))
    }

    async fn local_system_info(&self) -> SystemInfo {
        if !cfg!(unix) {
            return SystemInfo {
                os: std::env::consts::OS.to_string(),
                hostname: NOT_AVAILABLE.to_string(),
                uptime: NOT_AVAILABLE.to_string(),
                memory: NOT_AVAILABLE.to_string(),
                disk: NOT_AVAILABLE.to_string(),
                is_remote: false,
            };
        }

        let executor = self.local_executor();
        let argvs: Vec<Vec<String>> = PROBE_COMMANDS
            .iter()
            .map(|command| vec!["sh".to_string(), "-c".to_string(), command.to_string()])
            .collect();
        let results = join_all(argvs.iter().map(|argv| executor.run(argv, &[]))).await;

        let outputs: Vec<Option<String>> = results
            .into_iter()
            .map(|r| r.ok().filter(|r| r.success).map(|r| r.stdout))
            .collect();
        let mut info = SystemInfo::from_outputs(outputs, false);
        if info.os == NOT_AVAILABLE {
            info.os = std::env::consts::OS.to_string();
        }
        info
    }

    /// Rollback backups, newest first; a missing directory is an empty list
    pub async fn backups(&self) -> ResultEnvelope {
        info!("getting list of backups");
        let dir = &self.paths().backups_dir;

        let entries = match self.transport() {
            Ok(TransportConfig::Remote(target)) => self.remote_backups(&target, dir).await,
            _ => local_backups(dir).await,
        };

        info!(count = entries.len(), "found backups");
        to_envelope(&entries)
    }

    async fn remote_backups(&self, target: &RemoteTarget, dir: &Path) -> Vec<BackupEntry> {
        let command = format!(
            "ls -1 {}/*.json 2>/dev/null || echo \"\"",
            quote_arg(&dir.to_string_lossy())
        );
        match self.remote_executor().run(&command, target).await {
            Ok(result) if result.success => parse_backup_entries(result.stdout.lines()),
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to list remote backups");
                Vec::new()
            }
        }
    }
}

async fn local_backups(dir: &Path) -> Vec<BackupEntry> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "backups directory unavailable");
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    parse_backup_entries(names.iter().map(String::as_str))
}

fn to_envelope<T: Serialize>(value: &T) -> ResultEnvelope {
    match serde_json::to_value(value) {
        Ok(data) => ResultEnvelope::ok(data),
        Err(e) => ResultEnvelope::failure(e.to_string()),
    }
}
