//! Wiring of the three actors into one run group.

use crate::config::ReloaderConfig;
use crate::error::Result;
use crate::group::Group;
use crate::signal::SignalActor;
use crate::stats::SupervisorStats;
use crate::supervisor::ChildSupervisor;
use crate::watcher::ConfigWatcher;

/// A fully constructed reloader, ready to run.
///
/// Construction performs every startup-fatal step (config validation, watch
/// registration, signal registration); nothing runs until [`Reloader::run`].
pub struct Reloader {
    group: Group,
    stats: SupervisorStats,
}

impl Reloader {
    /// Builds the reloader with OS signal handling.
    ///
    /// # Errors
    /// Returns an error if the config is invalid, the watch cannot be set up,
    /// or signal handlers cannot be registered.
    pub fn new(config: &ReloaderConfig) -> Result<Self> {
        Self::with_signal(config, SignalActor::new()?)
    }

    /// Builds the reloader with a caller-provided signal actor.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the watch cannot be set up.
    pub fn with_signal(config: &ReloaderConfig, signal: SignalActor) -> Result<Self> {
        config.validate()?;

        let supervisor = ChildSupervisor::new(config);
        let watcher = ConfigWatcher::new(config, supervisor.kill_switch())?;
        let stats = supervisor.stats();

        let mut group = Group::new();
        group.add_actor(signal);
        group.add_actor(supervisor);
        group.add_actor(watcher);

        Ok(Self { group, stats })
    }

    /// Returns the supervisor counters.
    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        self.stats.clone()
    }

    /// Runs until a signal arrives or an actor stops.
    ///
    /// # Errors
    /// Returns the error of the actor that triggered shutdown.
    pub async fn run(self) -> Result<()> {
        self.group.run().await
    }
}
