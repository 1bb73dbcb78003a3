// Execution guard and advisory command monitor

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Single-flight gate for one long-running operation.
///
/// In-process only; not a cross-process lock.
#[derive(Debug)]
pub struct ExecutionGuard {
    name: &'static str,
    busy: AtomicBool,
}

impl ExecutionGuard {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: AtomicBool::new(false),
        }
    }

    /// Returns false while a prior acquisition is unreleased
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if acquired {
            debug!(guard = self.name, "guard acquired");
        } else {
            warn!(guard = self.name, "operation already in progress, rejecting duplicate request");
        }
        acquired
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
        debug!(guard = self.name, "guard released");
    }

    /// RAII form of [`try_acquire`](Self::try_acquire)
    pub fn acquire(&self) -> Option<GuardPermit<'_>> {
        self.try_acquire().then_some(GuardPermit { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases its guard on drop
#[derive(Debug)]
pub struct GuardPermit<'a> {
    guard: &'a ExecutionGuard,
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

/// Counts external-tool invocations in flight.
///
/// Overlap is logged and counted, never blocked: it surfaces caller
/// defects without changing behavior.
#[derive(Debug, Default)]
pub struct CommandMonitor {
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
}

impl CommandMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an invocation as started
    pub fn enter(&self, label: &str) -> MonitorTicket<'_> {
        let previous = self.in_flight.fetch_add(1, Ordering::AcqRel);
        if previous > 0 {
            self.overlaps.fetch_add(1, Ordering::AcqRel);
            warn!(
                command = label,
                in_flight = previous,
                "command already in progress, potential duplicate call detected"
            );
        }
        MonitorTicket { monitor: self }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of overlapping starts observed so far
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::Acquire)
    }
}

/// Marks its invocation finished on drop
#[derive(Debug)]
pub struct MonitorTicket<'a> {
    monitor: &'a CommandMonitor,
}

impl Drop for MonitorTicket<'_> {
    fn drop(&mut self) {
        self.monitor.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
