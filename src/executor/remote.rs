// Remote executor - runs one command line on a host over ssh

use crate::executor::stream::{spawn_piped, supervise};
use crate::executor::{ExecutionResult, ExecutorConfig, ExecutorError, Result};
use crate::settings::{AuthMethod, RemoteTarget};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Echoed by `test_connection`; must come back verbatim
pub const SSH_TEST_SENTINEL: &str = "SSH_TEST_OK";

const SSHPASS_INSTALL_HINT: &str = "Install it with `brew install hudochenkov/sshpass/sshpass` (macOS) or `apt install sshpass` (Debian/Ubuntu)";

/// ssh reports its own connection and auth failures as 255
const SSH_CONNECTION_ERROR: i32 = 255;
/// sshpass: invalid password
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass: host public key is unknown
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

/// Replace a leading `~` with the resolved home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Double-quote one argument for a remote POSIX shell.
///
/// Embedded `"` are backslash-escaped. Backslash, `$` and backtick stay
/// special inside double quotes and are escaped the same way.
pub fn quote_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Which client a session is opened with
#[derive(Debug, Clone, Copy)]
enum Client {
    Ssh,
    Scp,
}

/// Session transport over the system ssh/scp clients
#[derive(Debug, Clone, Default)]
pub struct RemoteExecutor {
    config: ExecutorConfig,
}

impl RemoteExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Options shared by every session: host-key prompts off, bounded
    /// connect, identity file for key auth
    pub fn session_options(&self, target: &RemoteTarget) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
        ];
        if !target.auth.is_password() {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        if let AuthMethod::PrivateKey(key) = &target.auth {
            args.push("-i".to_string());
            args.push(expand_tilde(key).to_string_lossy().into_owned());
        }
        args
    }

    /// Full ssh argument vector for running `command_line` on `target`
    pub fn ssh_args(&self, target: &RemoteTarget, command_line: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), target.port.to_string()];
        args.extend(self.session_options(target));
        args.push(target.destination());
        args.push(command_line.to_string());
        args
    }

    /// Full scp argument vector for downloading `remote_path` to `local_path`
    pub fn scp_args(&self, target: &RemoteTarget, remote_path: &str, local_path: &Path) -> Vec<String> {
        let mut args = vec!["-P".to_string(), target.port.to_string()];
        args.extend(self.session_options(target));
        args.push(format!("{}:{}", target.destination(), remote_path));
        args.push(local_path.to_string_lossy().into_owned());
        args
    }

    fn program(&self, client: Client) -> &str {
        match client {
            Client::Ssh => &self.config.ssh_program,
            Client::Scp => &self.config.scp_program,
        }
    }

    /// Password auth goes through sshpass; the password travels in the
    /// environment, never on the argument vector
    fn base_command(&self, target: &RemoteTarget, client: Client) -> Command {
        match &target.auth {
            AuthMethod::Password(password) => {
                debug!("using password authentication via sshpass");
                let mut cmd = Command::new(&self.config.sshpass_program);
                cmd.arg("-e").arg(self.program(client)).env("SSHPASS", password);
                cmd
            }
            AuthMethod::PrivateKey(key) => {
                debug!(key = %key.display(), "using key-based authentication");
                Command::new(self.program(client))
            }
            AuthMethod::Default => Command::new(self.program(client)),
        }
    }

    fn spawn_error(&self, target: &RemoteTarget, client: Client, err: std::io::Error) -> ExecutorError {
        if target.auth.is_password() && err.kind() == ErrorKind::NotFound {
            return ExecutorError::TransportAuthFailure(format!(
                "sshpass not found ({}): password authentication requires sshpass. {}",
                self.config.sshpass_program, SSHPASS_INSTALL_HINT
            ));
        }
        ExecutorError::SpawnFailure(self.program(client).to_string(), err.to_string())
    }

    async fn open_session(
        &self,
        target: &RemoteTarget,
        client: Client,
        args: Vec<String>,
    ) -> Result<ExecutionResult> {
        let mut cmd = self.base_command(target, client);
        cmd.args(&args);

        let child = spawn_piped(&mut cmd).map_err(|e| {
            warn!(host = %target.host, error = %e, "remote session failed to start");
            self.spawn_error(target, client, e)
        })?;

        let result = supervise(child, self.program(client)).await?;
        classify(target, result)
    }

    /// Run `command_line` on `target` to completion
    pub async fn run(&self, command_line: &str, target: &RemoteTarget) -> Result<ExecutionResult> {
        let start = Instant::now();
        info!(
            host = %target.host,
            port = target.port,
            user = %target.username,
            command = %command_line,
            "executing remote command"
        );

        let result = self
            .open_session(target, Client::Ssh, self.ssh_args(target, command_line))
            .await?;

        info!(
            host = %target.host,
            duration_ms = start.elapsed().as_millis() as u64,
            exit_code = ?result.exit_code,
            "remote command finished"
        );
        Ok(result)
    }

    /// Open a session that only echoes the sentinel
    pub async fn test_connection(&self, target: &RemoteTarget) -> Result<()> {
        info!(
            host = %target.host,
            port = target.port,
            user = %target.username,
            password = target.auth.is_password(),
            "testing ssh connection"
        );

        let command_line = format!("echo \"{}\"", SSH_TEST_SENTINEL);
        let result = self
            .open_session(target, Client::Ssh, self.ssh_args(target, &command_line))
            .await?;

        if result.exit_code == Some(0) && result.stdout.contains(SSH_TEST_SENTINEL) {
            info!(host = %target.host, "ssh connection ok");
            return Ok(());
        }

        let stderr = result.stderr.trim();
        let message = if !stderr.is_empty() {
            stderr.to_string()
        } else {
            let code = result
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            match &target.auth {
                AuthMethod::Password(_) => format!(
                    "Connection failed (code: {}). Make sure sshpass is installed. {}",
                    code, SSHPASS_INSTALL_HINT
                ),
                AuthMethod::PrivateKey(key) => format!(
                    "Connection failed (code: {}). Check your SSH key permissions: chmod 600 {}",
                    code,
                    key.display()
                ),
                AuthMethod::Default => format!("Connection failed (code: {})", code),
            }
        };
        warn!(host = %target.host, error = %message, "ssh connection test failed");
        Err(ExecutorError::TransportAuthFailure(message))
    }

    /// Download one file from `target` over scp
    pub async fn copy_from_remote(
        &self,
        target: &RemoteTarget,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        info!(
            host = %target.host,
            remote = %remote_path,
            local = %local_path.display(),
            "downloading remote artifact"
        );

        let result = self
            .open_session(target, Client::Scp, self.scp_args(target, remote_path, local_path))
            .await?;

        if result.exit_code != Some(0) {
            let stderr = result.stderr.trim();
            return Err(ExecutorError::NonZeroExit {
                code: result.exit_code,
                message: format!("Failed to download report: {}", stderr),
            });
        }
        Ok(())
    }
}

/// Separate transport failures from tool exits
fn classify(target: &RemoteTarget, result: ExecutionResult) -> Result<ExecutionResult> {
    let transport_failure = match result.exit_code {
        Some(SSH_CONNECTION_ERROR) => true,
        Some(SSHPASS_BAD_PASSWORD | SSHPASS_HOST_KEY_UNKNOWN) => target.auth.is_password(),
        _ => false,
    };
    if !transport_failure {
        return Ok(result);
    }

    let stderr = result.stderr.trim();
    let message = if stderr.is_empty() {
        format!(
            "SSH connection to {} failed (code: {})",
            target.destination(),
            result.exit_code.unwrap_or_default()
        )
    } else {
        format!("SSH error: {}", stderr)
    };
    warn!(host = %target.host, exit_code = ?result.exit_code, "ssh transport failure");
    Err(ExecutorError::TransportAuthFailure(message))
}
