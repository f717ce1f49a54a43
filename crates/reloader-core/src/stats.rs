//! Supervisor counters.
//!
//! # Toyota Way: Visual Management (目で見る管理)
//! Make the restart loop visible at a glance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Shared, read-only view of the child supervisor's activity.
///
/// Only the supervisor task writes; clones hand out the same counters.
#[derive(Debug, Clone, Default)]
pub struct SupervisorStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    launches: AtomicU64,
    launch_failures: AtomicU64,
    exits: AtomicU64,
    kill_requests: AtomicU64,
    // 0 while no child is tracked
    current_pid: AtomicU32,
}

impl SupervisorStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_launch(&self, pid: Option<u32>) {
        self.inner.launches.fetch_add(1, Ordering::SeqCst);
        self.inner
            .current_pid
            .store(pid.unwrap_or(0), Ordering::SeqCst);
    }

    pub(crate) fn record_launch_failure(&self) {
        self.inner.launch_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_exit(&self) {
        self.inner.current_pid.store(0, Ordering::SeqCst);
        self.inner.exits.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_kill_request(&self) {
        self.inner.kill_requests.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of successful launches.
    #[must_use]
    pub fn launches(&self) -> u64 {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Returns the number of failed launch attempts.
    #[must_use]
    pub fn launch_failures(&self) -> u64 {
        self.inner.launch_failures.load(Ordering::SeqCst)
    }

    /// Returns the number of observed child exits (natural or killed).
    #[must_use]
    pub fn exits(&self) -> u64 {
        self.inner.exits.load(Ordering::SeqCst)
    }

    /// Returns the number of kill requests acted on.
    #[must_use]
    pub fn kill_requests(&self) -> u64 {
        self.inner.kill_requests.load(Ordering::SeqCst)
    }

    /// Returns the pid of the tracked child, if one is running.
    #[must_use]
    pub fn current_pid(&self) -> Option<u32> {
        match self.inner.current_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Returns the number of children alive right now (0 or 1).
    #[must_use]
    pub fn live_children(&self) -> u64 {
        self.launches().saturating_sub(self.exits())
    }
}
