//! Config directory watcher.
//!
//! Watches a directory with [`notify`] and kills the supervised child on
//! every qualifying event; the supervisor relaunches it with the new config.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ReloaderConfig;
use crate::error::{ReloadError, Result};
use crate::filter::{EventFilter, WatchEvent};
use crate::group::{Actor, Interrupt, StopCause};
use crate::supervisor::KillSwitch;

/// Raw notification as delivered by the watch backend.
pub type RawEvent = notify::Result<notify::Event>;

/// OS watch handle plus the directory it is registered on.
struct WatchHandle {
    watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl WatchHandle {
    fn close(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "watcher close error");
        }
    }
}

/// Watches the config directory and restarts the child on creation events.
pub struct ConfigWatcher {
    events: mpsc::UnboundedReceiver<RawEvent>,
    handle: Arc<Mutex<Option<WatchHandle>>>,
    filter: EventFilter,
    kill: KillSwitch,
    token: CancellationToken,
}

impl ConfigWatcher {
    /// Opens a watch on `config.watch_dir`.
    ///
    /// # Errors
    /// Returns [`ReloadError::WatchSetup`] if the watcher cannot be created
    /// or the directory cannot be registered.
    pub fn new(config: &ReloaderConfig, kill: KillSwitch) -> Result<Self> {
        let dir = config.watch_dir.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |event: RawEvent| {
            let _ = tx.send(event);
        })
        .map_err(|source| ReloadError::WatchSetup {
            path: dir.clone(),
            source,
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| ReloadError::WatchSetup {
                path: dir.clone(),
                source,
            })?;

        tracing::info!(dir = %dir.display(), "watching config directory");

        let mut this = Self::from_events(rx, kill, filter_for(config));
        this.handle = Arc::new(Mutex::new(Some(WatchHandle { watcher, dir })));
        Ok(this)
    }

    /// Builds a watcher fed by an external event stream instead of an OS watch handle.
    #[must_use]
    pub fn from_events(
        events: mpsc::UnboundedReceiver<RawEvent>,
        kill: KillSwitch,
        filter: EventFilter,
    ) -> Self {
        Self {
            events,
            handle: Arc::new(Mutex::new(None)),
            filter,
            kill,
            token: CancellationToken::new(),
        }
    }

    /// Returns the stop handle.
    #[must_use]
    pub fn stop_handle(&self) -> WatcherInterrupter {
        WatcherInterrupter {
            token: self.token.clone(),
            handle: Arc::clone(&self.handle),
            kill: self.kill.clone(),
        }
    }

    /// Processes events until stopped or until the watch backend fails.
    ///
    /// # Errors
    /// Returns [`ReloadError::Watch`] if the backend reports an error or the
    /// event stream ends without a stop request.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => {
                    tracing::debug!("config watcher stopped");
                    return Ok(());
                }
                received = self.events.recv() => match received {
                    Some(Ok(event)) => self.handle_event(WatchEvent::from(event)),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "watcher stopped");
                        return Err(ReloadError::watch(e.to_string()));
                    }
                    None if self.token.is_cancelled() => return Ok(()),
                    None => {
                        tracing::error!("watcher stopped");
                        return Err(ReloadError::watch("event stream closed"));
                    }
                },
            }
        }
    }

    fn handle_event(&self, event: WatchEvent) {
        if !self.filter.matches(&event) {
            tracing::trace!(op = ?event.op, path = %event.path.display(), "ignoring event");
            return;
        }

        tracing::info!(path = %event.path.display(), "config file changed");
        tracing::info!("stop child");
        if !self.kill.kill() {
            tracing::error!("stop child error: supervisor is gone");
        }
    }
}

fn filter_for(config: &ReloaderConfig) -> EventFilter {
    config
        .marker
        .as_ref()
        .map_or_else(EventFilter::new, EventFilter::with_marker)
}

/// Stops a [`ConfigWatcher`].
///
/// Interrupting signals stop, closes the OS watch handle and kills the
/// current child, all before returning.
#[derive(Clone)]
pub struct WatcherInterrupter {
    token: CancellationToken,
    handle: Arc<Mutex<Option<WatchHandle>>>,
    kill: KillSwitch,
}

impl WatcherInterrupter {
    /// Stops the watcher.
    pub fn stop(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.close();
        }
        self.kill.kill();
    }
}

impl Interrupt for WatcherInterrupter {
    fn interrupt(self, cause: &StopCause) {
        tracing::debug!(cause = %cause, "stopping config watcher");
        self.stop();
    }
}

#[async_trait]
impl Actor for ConfigWatcher {
    type Interrupter = WatcherInterrupter;

    fn name(&self) -> &'static str {
        "watcher"
    }

    fn interrupter(&self) -> Self::Interrupter {
        self.stop_handle()
    }

    async fn run(self) -> Result<()> {
        Self::run(self).await
    }
}
