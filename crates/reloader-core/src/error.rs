//! Error types for reloader-core.
//!
//! Per Iron Lotus Framework: All errors are explicit, no panics allowed.

use std::path::PathBuf;

/// Result type alias for reloader operations.
pub type Result<T> = std::result::Result<T, ReloadError>;

/// Error type for the reloader actors.
///
/// Only fatal variants may end the process with a nonzero status;
/// [`ReloadError::Spawn`] and [`ReloadError::Kill`] are logged and absorbed
/// by the supervisor loop.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// Reloader configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The directory watch could not be created or registered.
    #[error("failed to watch {path}: {source}")]
    WatchSetup {
        /// Directory that was being registered.
        path: PathBuf,
        /// Underlying watch error.
        #[source]
        source: notify::Error,
    },

    /// The watch subsystem reported an error after startup.
    #[error("watch error: {0}")]
    Watch(String),

    /// Signal handler registration failed.
    #[error("signal error: {0}")]
    Signal(String),

    /// The managed child could not be launched.
    #[error("failed to start {binary}: {source}")]
    Spawn {
        /// Binary that failed to launch.
        binary: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The managed child could not be killed.
    #[error("failed to kill child (pid {pid:?}): {source}")]
    Kill {
        /// Pid of the child, if still known.
        pid: Option<u32>,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// An actor task panicked.
    #[error("actor '{actor}' panicked: {message}")]
    ActorPanicked {
        /// Name of the actor.
        actor: String,
        /// Panic description from the runtime.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReloadError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a watch-subsystem error.
    #[must_use]
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Creates a signal error.
    #[must_use]
    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    /// Returns true if this error must end the process with a failure status.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Spawn { .. } | Self::Kill { .. })
    }
}
