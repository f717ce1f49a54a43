//! Child supervisor: keeps exactly one instance of the managed binary alive.
//!
//! # Toyota Way: Jidoka (自働化)
//! Automatic restart on exit, whatever the reason.
//!
//! The child handle lives inside the supervisor's run loop and is never
//! shared. Other actors stop or restart the child only by sending requests:
//! a [`KillSwitch`] asks for the current child to be killed (the loop then
//! relaunches it), a [`SupervisorInterrupter`] asks the loop to kill the
//! child and return.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ReloaderConfig, RestartPolicy};
use crate::error::{ReloadError, Result};
use crate::group::{Actor, Interrupt, StopCause};
use crate::stats::SupervisorStats;

/// Requests a kill of whichever child the supervisor currently tracks.
///
/// Requests made while no child is running are dropped at the next launch;
/// several requests against the same child collapse into one kill.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    tx: mpsc::UnboundedSender<()>,
}

impl KillSwitch {
    /// Requests a kill. Returns false if the supervisor is gone.
    pub fn kill(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Stops a [`ChildSupervisor`]: its run loop kills and reaps the child, then returns.
#[derive(Debug, Clone)]
pub struct SupervisorInterrupter {
    token: CancellationToken,
}

impl SupervisorInterrupter {
    /// Requests the supervisor to stop.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Interrupt for SupervisorInterrupter {
    fn interrupt(self, cause: &StopCause) {
        tracing::debug!(cause = %cause, "stopping child supervisor");
        self.stop();
    }
}

/// How a tracked child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCause {
    /// Exited by itself.
    Natural,
    /// Killed through a [`KillSwitch`].
    Killed,
    /// Killed because the supervisor is stopping.
    Stopped,
}

/// The running instance of the managed binary.
struct ManagedChild {
    child: Child,
    pid: Option<u32>,
    started: Instant,
}

impl ManagedChild {
    fn kill(&mut self) {
        if let Err(source) = self.child.start_kill() {
            let err = ReloadError::Kill {
                pid: self.pid,
                source,
            };
            tracing::error!(error = %err, "stop child error");
        }
    }
}

/// Supervises the managed binary.
pub struct ChildSupervisor {
    binary: PathBuf,
    args: Vec<OsString>,
    policy: RestartPolicy,
    token: CancellationToken,
    kill_tx: mpsc::UnboundedSender<()>,
    kill_rx: mpsc::UnboundedReceiver<()>,
    current: Option<ManagedChild>,
    stats: SupervisorStats,
}

impl ChildSupervisor {
    /// Creates a supervisor launching `<binary_path> -c <config_path>`.
    #[must_use]
    pub fn new(config: &ReloaderConfig) -> Self {
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        Self {
            binary: config.binary_path.clone(),
            args: config.child_args().iter().map(|a| a.to_os_string()).collect(),
            policy: config.restart.clone(),
            token: CancellationToken::new(),
            kill_tx,
            kill_rx,
            current: None,
            stats: SupervisorStats::new(),
        }
    }

    /// Returns a handle that kills the current child.
    #[must_use]
    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch {
            tx: self.kill_tx.clone(),
        }
    }

    /// Returns a stop handle.
    #[must_use]
    pub fn stop_handle(&self) -> SupervisorInterrupter {
        SupervisorInterrupter {
            token: self.token.clone(),
        }
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        self.stats.clone()
    }

    /// Runs the restart loop until stopped.
    ///
    /// Launch failures are logged and retried; they never end the loop, so
    /// this returns `Ok(())` once stopped.
    pub async fn run(mut self) -> Result<()> {
        // Consecutive unintended exits, drives the restart delay.
        let mut failures: u32 = 0;

        loop {
            if self.token.is_cancelled() {
                tracing::debug!("child supervisor stopped");
                return Ok(());
            }

            if self.current.is_none() {
                let delay = self.policy.delay_for(failures);
                if !delay.is_zero() {
                    tracing::info!(delay = ?delay, failures, "delaying child restart");
                    tokio::select! {
                        biased;
                        () = self.token.cancelled() => continue,
                        () = tokio::time::sleep(delay) => {}
                    }
                }

                match self.launch() {
                    Ok(child) => self.current = Some(child),
                    Err(e) => {
                        tracing::error!(error = %e, "start child error");
                        self.stats.record_launch_failure();
                        failures = failures.saturating_add(1);
                        tokio::task::yield_now().await;
                        continue;
                    }
                }
            }

            if let Some(mut child) = self.current.take() {
                let cause = wait_for_exit(&mut child, &self.token, &mut self.kill_rx).await;
                let uptime = child.started.elapsed();
                self.stats.record_exit();
                match cause {
                    ExitCause::Killed => {
                        self.stats.record_kill_request();
                        failures = 0;
                    }
                    ExitCause::Natural => failures = self.policy.next_failures(failures, uptime),
                    ExitCause::Stopped => {}
                }
            }
        }
    }

    fn launch(&mut self) -> Result<ManagedChild> {
        // Requests aimed at a previous child; the new one reads current config.
        while self.kill_rx.try_recv().is_ok() {}

        let child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ReloadError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let pid = child.id();
        self.stats.record_launch(pid);
        tracing::info!(pid = ?pid, binary = %self.binary.display(), "child started");

        Ok(ManagedChild {
            child,
            pid,
            started: Instant::now(),
        })
    }
}

/// Waits until the child exits. Kill and stop requests only trigger a kill;
/// the exit itself is always observed through `Child::wait`.
async fn wait_for_exit(
    managed: &mut ManagedChild,
    token: &CancellationToken,
    kill_rx: &mut mpsc::UnboundedReceiver<()>,
) -> ExitCause {
    let mut cause = ExitCause::Natural;

    let status = loop {
        tokio::select! {
            status = managed.child.wait() => break status,
            () = token.cancelled(), if cause != ExitCause::Stopped => {
                cause = ExitCause::Stopped;
                managed.kill();
            }
            Some(()) = kill_rx.recv(), if cause == ExitCause::Natural => {
                cause = ExitCause::Killed;
                managed.kill();
            }
        }
    };

    log_exit(managed, cause, &status);
    cause
}

fn log_exit(managed: &ManagedChild, cause: ExitCause, status: &std::io::Result<ExitStatus>) {
    let uptime = managed.started.elapsed();
    match status {
        Ok(status) if status.success() => {
            tracing::info!(pid = ?managed.pid, cause = ?cause, uptime = ?uptime, status = %status, "child exited");
        }
        Ok(status) => {
            tracing::error!(pid = ?managed.pid, cause = ?cause, uptime = ?uptime, status = %status, "child exited");
        }
        Err(e) => {
            tracing::error!(pid = ?managed.pid, cause = ?cause, uptime = ?uptime, error = %e, "child exited");
        }
    }
}

#[async_trait]
impl Actor for ChildSupervisor {
    type Interrupter = SupervisorInterrupter;

    fn name(&self) -> &'static str {
        "supervisor"
    }

    fn interrupter(&self) -> Self::Interrupter {
        self.stop_handle()
    }

    async fn run(self) -> Result<()> {
        Self::run(self).await
    }
}
