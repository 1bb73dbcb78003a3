// Stream capture for supervised child processes

use crate::executor::{ExecutionResult, ExecutorError, Result};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info};

const CHUNK_SIZE: usize = 4096;

/// Read `reader` to EOF, logging each chunk as it arrives
pub async fn capture<R: AsyncRead + Unpin>(mut reader: R, label: &str) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        debug!(stream = label, chunk = %String::from_utf8_lossy(&chunk[..n]), "output chunk");
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Spawn `cmd` with piped output streams and a null stdin
pub fn spawn_piped(cmd: &mut Command) -> std::io::Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

/// Wait for `child`, accumulating both streams concurrently with the exit
pub async fn supervise(mut child: Child, label: &str) -> Result<ExecutionResult> {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_task = async {
        match stdout_pipe {
            Some(pipe) => capture(pipe, "stdout").await,
            None => Ok(String::new()),
        }
    };
    let stderr_task = async {
        match stderr_pipe {
            Some(pipe) => capture(pipe, "stderr").await,
            None => Ok(String::new()),
        }
    };

    let (stdout, stderr, status) = tokio::join!(stdout_task, stderr_task, child.wait());

    let status =
        status.map_err(|e| ExecutorError::OutputCaptureFailed(label.to_string(), e.to_string()))?;
    let stdout =
        stdout.map_err(|e| ExecutorError::OutputCaptureFailed(label.to_string(), e.to_string()))?;
    let stderr =
        stderr.map_err(|e| ExecutorError::OutputCaptureFailed(label.to_string(), e.to_string()))?;

    let result = ExecutionResult::new(status.code(), stdout, stderr);

    info!(
        label = label,
        exit_code = ?result.exit_code,
        success = result.success,
        stdout_bytes = result.stdout.len(),
        stderr_bytes = result.stderr.len(),
        "process completed"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_accumulates_all_chunks() {
        let data = "x".repeat(CHUNK_SIZE * 3 + 17);
        let captured = capture(data.as_bytes(), "stdout").await.unwrap();
        assert_eq!(captured.len(), data.len());
    }

    #[tokio::test]
    async fn test_capture_is_lossy_on_invalid_utf8() {
        let bytes: &[u8] = &[b'o', b'k', 0xFF, b'!'];
        let captured = capture(bytes, "stdout").await.unwrap();
        assert!(captured.starts_with("ok"));
        assert!(captured.ends_with('!'));
    }
}
