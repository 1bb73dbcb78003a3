// Local executor - runs the tool as a child process on this machine

use crate::executor::stream::{spawn_piped, supervise};
use crate::executor::{ExecutionResult, ExecutorError, Result};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment the tool needs to emit well-formed UTF-8 on this platform
pub fn platform_env() -> Vec<(String, String)> {
    if cfg!(windows) {
        vec![
            ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
            ("PYTHONUTF8".to_string(), "1".to_string()),
        ]
    } else {
        Vec::new()
    }
}

/// Split a configured tool command into program and leading arguments.
///
/// `"python3 main.py"` yields `["python3", "main.py"]`.
pub fn split_tool_command(tool_path: &str) -> Vec<String> {
    tool_path.split_whitespace().map(str::to_string).collect()
}

/// Runs an argument vector locally; no shell, no escaping
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `argv` (program first) to completion with `env` overrides
    pub async fn run(&self, argv: &[String], env: &[(String, String)]) -> Result<ExecutionResult> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ExecutorError::SpawnFailure(
                String::new(),
                "empty argument vector".to_string(),
            ));
        };

        let start = Instant::now();
        info!(program = %program, args = ?args, "executing local command");

        let mut cmd = Command::new(program);
        cmd.args(args);

        let overrides = platform_env();
        if !overrides.is_empty() {
            debug!(count = overrides.len(), "applying platform encoding overrides");
        }
        for (key, value) in overrides.iter().chain(env.iter()) {
            cmd.env(key, value);
        }

        let child = spawn_piped(&mut cmd).map_err(|e| {
            warn!(program = %program, error = %e, "local process failed to start");
            ExecutorError::SpawnFailure(program.clone(), e.to_string())
        })?;

        let result = supervise(child, program).await?;

        info!(
            program = %program,
            duration_ms = start.elapsed().as_millis() as u64,
            exit_code = ?result.exit_code,
            "local command finished"
        );

        Ok(result)
    }
}
