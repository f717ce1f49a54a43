//! Reloader: keep-alive supervisor for config-reloading sidecars
//!
//! Runs one child process, relaunches it whenever it exits and kills it when
//! a file is created in the watched config directory.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use reloader::prelude::*;
//!
//! # async fn example() -> reloader::core::Result<()> {
//! let config = ReloaderConfig::default().with_marker("..data");
//! Reloader::new(&config)?.run().await
//! # }
//! ```

pub use reloader_core as core;

/// Prelude module for common imports.
pub mod prelude {
    pub use reloader_core::{
        BackoffConfig, ChildSupervisor, ConfigWatcher, Group, ReloadError, Reloader,
        ReloaderConfig, RestartPolicy, Signal, SignalActor, StopCause, SupervisorStats,
    };
}
