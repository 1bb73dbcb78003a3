// Data types for Executor module

use crate::executor::ExecutorError;
use serde::{Deserialize, Serialize};

/// Whether an exit code means the tool ran to completion.
///
/// `0` is "all checks passed", `1` is "some checks failed". Anything else,
/// including no code at all, is a failure.
pub fn is_success_exit(code: Option<i32>) -> bool {
    matches!(code, Some(0) | Some(1))
}

/// Raw outcome of running one process to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn new(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        Self {
            success: is_success_exit(exit_code),
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Convert a failed run into its `NonZeroExit` error
    pub fn into_checked(self) -> Result<Self, ExecutorError> {
        if self.success {
            Ok(self)
        } else {
            Err(ExecutorError::non_zero_exit(self.exit_code, &self.stderr))
        }
    }
}
