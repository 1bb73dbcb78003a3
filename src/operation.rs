// Logical operations an external caller can request

use crate::settings::SshSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selection for a compliance check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Hardening profile, e.g. basic/moderate/strict
    pub profile: Option<String>,
    pub categories: Vec<String>,
    pub rules: Vec<String>,
}

impl ScanConfig {
    /// Tool flags for this selection, without `--report`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(profile) = self.profile.as_deref().filter(|p| !p.is_empty()) {
            args.push("--level".to_string());
            args.push(profile.to_string());
        }
        if !self.categories.is_empty() {
            args.push("--categories".to_string());
            args.push(self.categories.join(","));
        }
        if !self.rules.is_empty() {
            args.push("--rules".to_string());
            args.push(self.rules.join(","));
        }
        args
    }
}

/// Every request the orchestrator serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Check(ScanConfig),
    Apply { rule_ids: Vec<String> },
    Rollback { rule_id: String },
    ListRules,
    GenerateReport { format: String },
    TestConnection(SshSettings),
    GetSettings,
    SaveSettings(Value),
    ReloadSettings,
    SystemInfo,
    Backups,
    Cancel,
}

impl Operation {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Check(_) => "check",
            Operation::Apply { .. } => "apply",
            Operation::Rollback { .. } => "rollback",
            Operation::ListRules => "list-rules",
            Operation::GenerateReport { .. } => "generate-report",
            Operation::TestConnection(_) => "test-connection",
            Operation::GetSettings => "get-settings",
            Operation::SaveSettings(_) => "save-settings",
            Operation::ReloadSettings => "reload-settings",
            Operation::SystemInfo => "system-info",
            Operation::Backups => "backups",
            Operation::Cancel => "cancel",
        }
    }
}
