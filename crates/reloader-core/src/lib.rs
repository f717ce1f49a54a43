// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # reloader-core
//!
//! Keep-alive and config-reload supervision for a single child process.
//!
//! Three actors run in one [`Group`]:
//!
//! - [`SignalActor`] waits for SIGINT/SIGTERM
//! - [`ChildSupervisor`] launches `<binary> -c <config>` and relaunches it on every exit
//! - [`ConfigWatcher`] kills the child when a file is created in the watch directory
//!
//! The first actor to stop interrupts the others; the group returns once all
//! of them have stopped and the child has been reaped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use reloader_core::{Reloader, ReloaderConfig};
//!
//! # async fn example() -> reloader_core::Result<()> {
//! let config = ReloaderConfig::default();
//! Reloader::new(&config)?.run().await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod filter;
pub mod group;
pub mod reloader;
pub mod signal;
pub mod stats;
pub mod supervisor;
#[cfg(test)]
pub mod tests;
pub mod watcher;

pub use config::{BackoffConfig, ReloaderConfig, RestartPolicy};
pub use error::{ReloadError, Result};
pub use filter::{EventFilter, WatchEvent, WatchOp, is_qualifying};
pub use group::{Actor, ActorState, Group, Interrupt, StopCause};
pub use reloader::Reloader;
pub use signal::{Signal, SignalActor, SignalInterrupter};
pub use stats::SupervisorStats;
pub use supervisor::{ChildSupervisor, KillSwitch, SupervisorInterrupter};
pub use watcher::{ConfigWatcher, RawEvent, WatcherInterrupter};
