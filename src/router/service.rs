// Command router: backend selection, guarded execution, retrieval

use crate::envelope::ResultEnvelope;
use crate::executor::{
    ExecutionResult, ExecutorConfig, ExecutorError, LocalExecutor, RemoteExecutor,
};
use crate::guard::{CommandMonitor, ExecutionGuard};
use crate::operation::{Operation, ScanConfig};
use crate::retriever::{LocalArtifactStore, RemoteArtifactStore, Retriever, RetryPolicy};
use crate::router::RouterError;
use crate::router::request::{ExecutionRequest, Subcommand, artifact_file_name};
use crate::settings::{RemoteTarget, SettingsStore, SshSettings, TransportConfig};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Directories the router writes to or reads from
#[derive(Debug, Clone)]
pub struct RouterPaths {
    /// Local report artifacts
    pub data_dir: PathBuf,
    /// Remote report artifacts
    pub remote_scratch_dir: String,
    /// Where remote reports are downloaded to
    pub download_dir: PathBuf,
    /// The tool's rollback backups
    pub backups_dir: PathBuf,
}

impl RouterPaths {
    /// Artifact location on the side the tool runs on
    pub fn scratch_path(&self, transport: &TransportConfig, file_name: &str) -> PathBuf {
        match transport {
            TransportConfig::Local { .. } => self.data_dir.join(file_name),
            TransportConfig::Remote(_) => PathBuf::from(format!(
                "{}/{}",
                self.remote_scratch_dir.trim_end_matches('/'),
                file_name
            )),
        }
    }
}

/// Top-level entry point for every operation
pub struct CommandRouter {
    settings: Arc<SettingsStore>,
    local: LocalExecutor,
    remote: RemoteExecutor,
    retriever: Retriever,
    check_guard: ExecutionGuard,
    monitor: CommandMonitor,
    paths: RouterPaths,
}

impl CommandRouter {
    pub fn new(
        settings: Arc<SettingsStore>,
        executor_config: ExecutorConfig,
        retry: RetryPolicy,
        paths: RouterPaths,
    ) -> Self {
        debug!(
            retry_delay_ms = retry.delay.as_millis() as u64,
            retry_attempts = retry.attempts(),
            data_dir = %paths.data_dir.display(),
            "initializing command router"
        );
        Self {
            settings,
            local: LocalExecutor::new(),
            remote: RemoteExecutor::new(executor_config),
            retriever: Retriever::new(retry),
            check_guard: ExecutionGuard::new("scan"),
            monitor: CommandMonitor::new(),
            paths,
        }
    }

    pub fn monitor(&self) -> &CommandMonitor {
        &self.monitor
    }

    pub(crate) fn local_executor(&self) -> &LocalExecutor {
        &self.local
    }

    pub(crate) fn remote_executor(&self) -> &RemoteExecutor {
        &self.remote
    }

    pub(crate) fn paths(&self) -> &RouterPaths {
        &self.paths
    }

    /// Route one operation, tagging its logs with a request id
    pub async fn dispatch(&self, operation: Operation) -> ResultEnvelope {
        let span = info_span!("operation", request_id = %Uuid::new_v4(), op = operation.name());
        async move {
            info!("operation started");
            let envelope = match operation {
                Operation::Check(scan) => self.check(scan).await,
                Operation::Apply { rule_ids } => self.apply(&rule_ids).await,
                Operation::Rollback { rule_id } => self.rollback(&rule_id).await,
                Operation::ListRules => self.list_rules().await,
                Operation::GenerateReport { format } => self.generate_report(&format).await,
                Operation::TestConnection(ssh) => self.test_connection(&ssh).await,
                Operation::GetSettings => self.get_settings(),
                Operation::SaveSettings(patch) => self.save_settings(patch),
                Operation::ReloadSettings => self.reload_settings(),
                Operation::SystemInfo => self.system_info().await,
                Operation::Backups => self.backups().await,
                Operation::Cancel => self.cancel(),
            };
            info!(success = envelope.success, "operation completed");
            envelope
        }
        .instrument(span)
        .await
    }

    /// Run a compliance check; rejected while another check is running
    pub async fn check(&self, scan: ScanConfig) -> ResultEnvelope {
        let Some(_permit) = self.check_guard.acquire() else {
            return envelope(Err(RouterError::OperationInProgress("Scan")));
        };

        envelope(self.run_check(scan).await)
    }

    async fn run_check(&self, scan: ScanConfig) -> Result<Value, RouterError> {
        let transport = self.transport()?;

        let report_path = self
            .paths
            .scratch_path(&transport, &artifact_file_name("json", chrono::Utc::now()));
        if !transport.is_remote() {
            self.ensure_data_dir().await;
        }

        let mut args = scan.to_args();
        args.push("--report".to_string());
        args.push(report_path.to_string_lossy().into_owned());

        info!(
            scan = ?scan,
            platform = std::env::consts::OS,
            report_path = %report_path.display(),
            "starting scan"
        );

        let request = ExecutionRequest::new(Subcommand::Check, args).with_report_path(report_path);
        self.execute(&transport, &request).await
    }

    /// Apply fixes for the given rules
    pub async fn apply(&self, rule_ids: &[String]) -> ResultEnvelope {
        if rule_ids.is_empty() {
            return envelope(Err(RouterError::InvalidRequest(
                "no rules selected".to_string(),
            )));
        }
        info!(rules = %rule_ids.join(", "), "applying hardening");
        let args = vec!["--rules".to_string(), rule_ids.join(","), "--force".to_string()];
        self.run(ExecutionRequest::new(Subcommand::Apply, args)).await
    }

    /// Roll back the latest change for one rule
    pub async fn rollback(&self, rule_id: &str) -> ResultEnvelope {
        if rule_id.trim().is_empty() {
            return envelope(Err(RouterError::InvalidRequest(
                "rule id is empty".to_string(),
            )));
        }
        let args = vec![
            "--rule-id".to_string(),
            rule_id.to_string(),
            "--latest".to_string(),
            "--force".to_string(),
        ];
        self.run(ExecutionRequest::new(Subcommand::Rollback, args)).await
    }

    pub async fn list_rules(&self) -> ResultEnvelope {
        self.run(ExecutionRequest::new(Subcommand::ListRules, Vec::new()))
            .await
    }

    /// Render a report; remote reports are downloaded afterwards
    pub async fn generate_report(&self, format: &str) -> ResultEnvelope {
        envelope(self.run_generate_report(format).await)
    }

    async fn run_generate_report(&self, format: &str) -> Result<Value, RouterError> {
        if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RouterError::InvalidRequest(format!(
                "unsupported report format '{}'",
                format
            )));
        }

        let transport = self.transport()?;
        let file_name = artifact_file_name(format, chrono::Utc::now());
        let output_path = self.paths.scratch_path(&transport, &file_name);
        if !transport.is_remote() {
            self.ensure_data_dir().await;
        }

        info!(format = %format, output = %output_path.display(), "generating report");

        let args = vec![
            "--format".to_string(),
            format.to_string(),
            "--output".to_string(),
            output_path.to_string_lossy().into_owned(),
        ];
        let request = ExecutionRequest::new(Subcommand::Report, args);
        self.run_tool(&transport, &request).await?;

        let path = match &transport {
            TransportConfig::Local { .. } => output_path,
            TransportConfig::Remote(target) => {
                let local_path = self.paths.download_dir.join(&file_name);
                tokio::fs::create_dir_all(&self.paths.download_dir)
                    .await
                    .map_err(ExecutorError::Io)?;
                self.remote
                    .copy_from_remote(target, &output_path.to_string_lossy(), &local_path)
                    .await?;
                info!(path = %local_path.display(), "report downloaded");
                local_path
            }
        };

        Ok(json!({ "path": path.to_string_lossy(), "format": format }))
    }

    /// Validate credentials without running the tool
    pub async fn test_connection(&self, ssh: &SshSettings) -> ResultEnvelope {
        let result = async {
            let target = RemoteTarget::try_from(ssh)?;
            self.remote.test_connection(&target).await?;
            Ok::<_, RouterError>(())
        }
        .await;

        match result {
            Ok(()) => ResultEnvelope::done(),
            Err(e) => envelope(Err(e)),
        }
    }

    pub fn get_settings(&self) -> ResultEnvelope {
        envelope(serde_json::to_value(self.settings.snapshot()).map_err(|e| {
            RouterError::Settings(e.into())
        }))
    }

    pub fn save_settings(&self, patch: Value) -> ResultEnvelope {
        match self.settings.save(patch) {
            Ok(_) => ResultEnvelope::done(),
            Err(e) => envelope(Err(e.into())),
        }
    }

    pub fn reload_settings(&self) -> ResultEnvelope {
        let settings = self.settings.reload();
        envelope(serde_json::to_value(settings).map_err(|e| RouterError::Settings(e.into())))
    }

    /// Advisory: already-spawned processes keep running
    pub fn cancel(&self) -> ResultEnvelope {
        info!(
            in_flight = self.monitor.in_flight(),
            "cancel requested; running processes are not signalled"
        );
        ResultEnvelope::done()
    }

    pub(crate) fn transport(&self) -> Result<TransportConfig, RouterError> {
        Ok(self.settings.snapshot().transport()?)
    }

    async fn run(&self, request: ExecutionRequest) -> ResultEnvelope {
        let result = match self.transport() {
            Ok(transport) => self.execute(&transport, &request).await,
            Err(e) => Err(e),
        };
        envelope(result)
    }

    /// Run the tool and require a success exit
    async fn run_tool(
        &self,
        transport: &TransportConfig,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, RouterError> {
        let _ticket = self.monitor.enter(request.subcommand.as_str());

        let result = match transport {
            TransportConfig::Local { tool_path } => {
                let argv = request.local_argv(tool_path);
                self.local.run(&argv, &[]).await?
            }
            TransportConfig::Remote(target) => {
                let command_line = request.remote_command_line(&target.tool_path);
                self.remote.run(&command_line, target).await?
            }
        };

        Ok(result.into_checked().inspect_err(|e| {
            warn!(subcommand = request.subcommand.as_str(), error = %e, "command failed");
        })?)
    }

    /// Run the tool and resolve its structured result
    async fn execute(
        &self,
        transport: &TransportConfig,
        request: &ExecutionRequest,
    ) -> Result<Value, RouterError> {
        let result = self.run_tool(transport, request).await?;
        let report_path = request.report_path.as_deref();

        let retrieved = match transport {
            TransportConfig::Local { .. } => {
                self.retriever
                    .resolve_local(&LocalArtifactStore, &result, report_path)
                    .await
            }
            TransportConfig::Remote(target) => {
                let store = RemoteArtifactStore::new(self.remote.clone(), target.clone());
                self.retriever
                    .resolve_remote(&store, &result, report_path)
                    .await
            }
        };

        match retrieved {
            Ok(retrieved) => {
                debug!(stage = ?retrieved.stage, "payload resolved");
                Ok(retrieved.payload)
            }
            Err(error) if report_path.is_none() => Err(RouterError::Unparsed {
                error,
                stdout: result.stdout,
            }),
            Err(error) => Err(error.into()),
        }
    }

    async fn ensure_data_dir(&self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.paths.data_dir).await {
            warn!(dir = %self.paths.data_dir.display(), error = %e, "failed to create data directory");
        }
    }
}

/// Fold a router outcome into the caller-facing envelope
fn envelope(result: Result<Value, RouterError>) -> ResultEnvelope {
    match result {
        Ok(data) => ResultEnvelope::ok(data),
        Err(RouterError::Unparsed { error, stdout }) => {
            warn!(error = %error, "no structured output recovered");
            ResultEnvelope::failure_with_data(error.to_string(), Value::String(stdout))
        }
        Err(e) => {
            match &e {
                RouterError::OperationInProgress(_) | RouterError::InvalidRequest(_) => {
                    warn!(error = %e, "request rejected")
                }
                RouterError::Executor(ExecutorError::SpawnFailure(..)) => {
                    error!(error = %e, "tool could not be started")
                }
                _ => warn!(error = %e, "operation failed"),
            }
            ResultEnvelope::failure(e.to_string())
        }
    }
}
