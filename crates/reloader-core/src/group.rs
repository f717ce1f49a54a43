//! Run group: coordinated start and fan-out shutdown of actors.
//!
//! # Toyota Way: Jidoka (自働化)
//! When one actor stops, the whole line stops.
//!
//! Every actor is registered as an (execute, interrupt) pair. [`Group::run`]
//! spawns all execute futures at once and waits for the first to return.
//! That actor's outcome becomes the group's outcome; every OTHER actor is
//! then interrupted with a [`StopCause`] and the group waits until all of
//! them have returned.
//!
//! ```text
//! Registered → Running → Stopping → Stopped
//!                  └──────────────────┘  (the actor that triggered shutdown)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::task::{Id, JoinError, JoinSet};

use crate::error::{ReloadError, Result};

/// Why an actor is being interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCause {
    /// The named actor returned an error.
    Failed {
        /// Actor that failed.
        actor: String,
        /// Rendered error.
        message: String,
    },
    /// The named actor returned cleanly.
    SiblingStopped {
        /// Actor that stopped.
        actor: String,
    },
}

impl StopCause {
    fn from_outcome(actor: &str, outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => Self::SiblingStopped {
                actor: actor.to_string(),
            },
            Err(e) => Self::Failed {
                actor: actor.to_string(),
                message: e.to_string(),
            },
        }
    }

    /// Returns the actor that triggered the shutdown.
    #[must_use]
    pub fn actor(&self) -> &str {
        match self {
            Self::Failed { actor, .. } | Self::SiblingStopped { actor } => actor,
        }
    }

    /// Returns true if shutdown was triggered by an error.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { actor, message } => write!(f, "{actor} failed: {message}"),
            Self::SiblingStopped { actor } => write!(f, "{actor} stopped"),
        }
    }
}

/// Lifecycle of a registered actor inside a [`Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Added to the group; not yet spawned.
    Registered,
    /// Execute future is running.
    Running,
    /// Interrupt was delivered; execute has not returned yet.
    Stopping,
    /// Execute returned.
    Stopped,
}

/// Interrupt half of an actor registration.
///
/// Called at most once, synchronously, from the coordinator. Implementations
/// must not block: they request a stop and return.
pub trait Interrupt: Send + 'static {
    /// Asks the actor to stop.
    fn interrupt(self, cause: &StopCause);
}

impl<F> Interrupt for F
where
    F: FnOnce(&StopCause) + Send + 'static,
{
    fn interrupt(self, cause: &StopCause) {
        self(cause);
    }
}

/// An actor with a blocking run loop and a detachable interrupter.
#[async_trait]
pub trait Actor: Send + Sized + 'static {
    /// Handle used by the coordinator to stop this actor.
    type Interrupter: Interrupt;

    /// Name used in logs and stop causes.
    fn name(&self) -> &'static str;

    /// Returns the interrupter. Must be taken before `run` consumes the actor.
    fn interrupter(&self) -> Self::Interrupter;

    /// Runs until stopped or until the actor decides to stop.
    async fn run(self) -> Result<()>;
}

type ExecuteFn = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type InterruptFn = Box<dyn FnOnce(&StopCause) + Send>;

struct Registration {
    name: String,
    execute: ExecuteFn,
    interrupt: InterruptFn,
}

struct Slot {
    name: String,
    state: ActorState,
    interrupt: Option<InterruptFn>,
}

/// A set of actors that start together and stop together.
#[derive(Default)]
pub struct Group {
    registrations: Vec<Registration>,
}

impl Group {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw (execute, interrupt) pair.
    pub fn add<F, I>(&mut self, name: impl Into<String>, execute: F, interrupt: I)
    where
        F: Future<Output = Result<()>> + Send + 'static,
        I: Interrupt,
    {
        let name = name.into();
        tracing::debug!(actor = %name, state = ?ActorState::Registered, "actor registered");
        self.registrations.push(Registration {
            name,
            execute: Box::pin(execute),
            interrupt: Box::new(move |cause: &StopCause| interrupt.interrupt(cause)),
        });
    }

    /// Registers an [`Actor`].
    pub fn add_actor<A: Actor>(&mut self, actor: A) {
        let name = actor.name();
        let interrupter = actor.interrupter();
        self.add(name, actor.run(), interrupter);
    }

    /// Returns the number of registered actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns true if no actor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Runs every actor concurrently until the first one returns, then
    /// interrupts the rest and waits for all of them.
    ///
    /// Returns the outcome of the actor that triggered the shutdown. An empty
    /// group returns `Ok(())` immediately.
    ///
    /// Dropping the returned future aborts every actor that is still running.
    ///
    /// # Errors
    /// Returns the triggering actor's error, or
    /// [`ReloadError::ActorPanicked`] if it panicked.
    pub async fn run(self) -> Result<()> {
        if self.registrations.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        let mut ids = HashMap::with_capacity(self.registrations.len());
        let mut slots = Vec::with_capacity(self.registrations.len());

        for (index, registration) in self.registrations.into_iter().enumerate() {
            let Registration {
                name,
                execute,
                interrupt,
            } = registration;

            let id = tasks.spawn(execute).id();
            ids.insert(id, index);

            tracing::debug!(actor = %name, state = ?ActorState::Running, "actor started");
            slots.push(Slot {
                name,
                state: ActorState::Running,
                interrupt: Some(interrupt),
            });
        }

        let Some(joined) = tasks.join_next_with_id().await else {
            return Ok(());
        };
        let (trigger, outcome) = settle(joined, &ids, &slots);
        let trigger_name = trigger.map_or("unknown", |i| slots[i].name.as_str());
        let cause = StopCause::from_outcome(trigger_name, &outcome);

        tracing::info!(actor = %trigger_name, cause = %cause, "actor stopped, interrupting the rest");

        if let Some(i) = trigger {
            slots[i].state = ActorState::Stopped;
            slots[i].interrupt = None;
        }
        for slot in &mut slots {
            if let Some(interrupt) = slot.interrupt.take() {
                slot.state = ActorState::Stopping;
                tracing::debug!(actor = %slot.name, state = ?slot.state, "interrupting actor");
                interrupt(&cause);
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (index, result) = settle(joined, &ids, &slots);
            let Some(index) = index else { continue };
            let slot = &mut slots[index];
            slot.state = ActorState::Stopped;
            match result {
                Ok(()) => tracing::debug!(actor = %slot.name, state = ?slot.state, "actor stopped"),
                Err(e) => tracing::warn!(
                    actor = %slot.name,
                    state = ?slot.state,
                    error = %e,
                    "actor returned an error during shutdown"
                ),
            }
        }

        outcome
    }
}

/// Maps a finished task back to its slot; a panic becomes [`ReloadError::ActorPanicked`].
fn settle(
    joined: std::result::Result<(Id, Result<()>), JoinError>,
    ids: &HashMap<Id, usize>,
    slots: &[Slot],
) -> (Option<usize>, Result<()>) {
    match joined {
        Ok((id, outcome)) => (ids.get(&id).copied(), outcome),
        Err(e) => {
            let index = ids.get(&e.id()).copied();
            let actor = index.map_or_else(|| "unknown".to_string(), |i| slots[i].name.clone());
            (
                index,
                Err(ReloadError::ActorPanicked {
                    actor,
                    message: e.to_string(),
                }),
            )
        }
    }
}
