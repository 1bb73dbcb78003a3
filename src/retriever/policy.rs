// Retry policy for the local artifact wait loop

use std::time::Duration;

/// Bounded wait for a report file that may not be flushed at process exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Slept before every existence check, including the first
    pub delay: Duration,
    /// Number of existence checks before falling back
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Windows lags writing the report after exit; elsewhere one short wait
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            Self::new(Duration::from_millis(3000), 10)
        } else {
            Self::new(Duration::from_millis(500), 1)
        }
    }

    /// Zero attempts would skip the named artifact entirely
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_platform()
    }
}
