// Execution requests and command-line construction

use crate::executor::local::split_tool_command;
use crate::executor::remote::quote_arg;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Tool subcommands the router invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Check,
    Apply,
    Rollback,
    ListRules,
    Report,
}

impl Subcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subcommand::Check => "check",
            Subcommand::Apply => "apply",
            Subcommand::Rollback => "rollback",
            Subcommand::ListRules => "list-rules",
            Subcommand::Report => "report",
        }
    }

    /// Changes system state, so needs root on the remote side
    pub fn requires_privilege(&self) -> bool {
        matches!(self, Subcommand::Apply | Subcommand::Rollback)
    }
}

/// One invocation of the tool; built per call, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub subcommand: Subcommand,
    pub args: Vec<String>,
    /// Where the tool was told to write its JSON report
    pub report_path: Option<PathBuf>,
    pub privileged: bool,
}

impl ExecutionRequest {
    pub fn new(subcommand: Subcommand, args: Vec<String>) -> Self {
        Self {
            subcommand,
            args,
            report_path: None,
            privileged: subcommand.requires_privilege(),
        }
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Subcommand followed by its flags
    pub fn tool_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.subcommand.as_str().to_string());
        args.extend(self.args.iter().cloned());
        args
    }

    /// Argument vector for the local backend; no quoting needed
    pub fn local_argv(&self, tool_path: &str) -> Vec<String> {
        let mut argv = split_tool_command(tool_path);
        argv.extend(self.tool_args());
        argv
    }

    /// Single command line for the remote backend, every argument quoted
    pub fn remote_command_line(&self, tool_path: &str) -> String {
        let quoted = self
            .tool_args()
            .iter()
            .map(|arg| quote_arg(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let invocation = remote_invocation(tool_path);
        if self.privileged {
            format!("sudo {} {}", invocation, quoted)
        } else {
            format!("{} {}", invocation, quoted)
        }
    }
}

/// Paths relative to the login directory are run as `./<path>`
fn remote_invocation(tool_path: &str) -> String {
    let tool_path = tool_path.trim();
    if tool_path.starts_with('/') || tool_path.starts_with("./") || tool_path.starts_with("~/") {
        tool_path.to_string()
    } else {
        format!("./{}", tool_path)
    }
}

/// Timestamp-derived artifact name, unique per operation
pub fn artifact_file_name(extension: &str, now: DateTime<Utc>) -> String {
    format!("syshardn-report-{}.{}", now.timestamp_millis(), extension)
}
