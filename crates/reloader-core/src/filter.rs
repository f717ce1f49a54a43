//! Watch event classification.
//!
//! Only creation events restart the managed child. Mounted ConfigMaps and
//! Secrets are updated by swapping a symlink, which surfaces as a create in
//! the mount directory.

use std::path::PathBuf;

use notify::EventKind;
use notify::event::ModifyKind;
use serde::{Deserialize, Serialize};

/// Operation carried by a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchOp {
    /// A file or directory was created.
    Create,
    /// File contents were written.
    Write,
    /// A file or directory was removed.
    Remove,
    /// A file or directory was renamed.
    Rename,
    /// Permissions or other metadata changed.
    Chmod,
    /// Access or an unclassified event.
    Other,
}

impl From<&EventKind> for WatchOp {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Chmod,
            EventKind::Modify(_) => Self::Write,
            EventKind::Remove(_) => Self::Remove,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}

/// A single filesystem event observed in the watch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened.
    pub op: WatchOp,
    /// Where it happened (empty if the backend did not report a path).
    pub path: PathBuf,
}

impl WatchEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(op: WatchOp, path: impl Into<PathBuf>) -> Self {
        Self {
            op,
            path: path.into(),
        }
    }
}

impl From<notify::Event> for WatchEvent {
    fn from(event: notify::Event) -> Self {
        let op = WatchOp::from(&event.kind);
        let path = event.paths.into_iter().next().unwrap_or_default();
        Self { op, path }
    }
}

/// Returns true if the event should restart the managed child.
///
/// Looks at the operation only; the path is never consulted.
#[must_use]
pub fn is_qualifying(event: &WatchEvent) -> bool {
    event.op == WatchOp::Create
}

/// Event filter with an opt-in marker file name.
///
/// Without a marker this is exactly [`is_qualifying`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    marker: Option<String>,
}

impl EventFilter {
    /// Creates a filter accepting every creation event.
    #[must_use]
    pub const fn new() -> Self {
        Self { marker: None }
    }

    /// Creates a filter that also requires the created file to be named `marker`.
    #[must_use]
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: Some(marker.into()),
        }
    }

    /// Returns the configured marker, if any.
    #[must_use]
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Returns true if the event should restart the managed child.
    #[must_use]
    pub fn matches(&self, event: &WatchEvent) -> bool {
        if !is_qualifying(event) {
            return false;
        }
        match &self.marker {
            None => true,
            Some(marker) => event
                .path
                .file_name()
                .is_some_and(|name| name == marker.as_str()),
        }
    }
}
