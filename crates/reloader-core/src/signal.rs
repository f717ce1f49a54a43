//! Termination signal actor.
//!
//! ## Unix
//! SIGINT and SIGTERM end the actor (and therefore the whole group) cleanly.
//! Handlers are registered when the actor is constructed so a signal sent
//! right after startup is not lost.
//!
//! ## Other platforms
//! Only [`tokio::signal::ctrl_c`] is awaited.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ReloadError, Result};
use crate::group::{Actor, Interrupt, StopCause};

/// Shutdown signals understood by the reloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Interrupt (Ctrl-C).
    Int,
    /// Terminate (container stop).
    Term,
}

impl Signal {
    /// Returns the Unix signal number.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Int => 2,
            Self::Term => 15,
        }
    }
}

type SignalSource = Pin<Box<dyn Future<Output = Result<Signal>> + Send>>;

/// Waits for a shutdown signal.
pub struct SignalActor {
    source: SignalSource,
    token: CancellationToken,
}

impl SignalActor {
    /// Registers the OS signal handlers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`ReloadError::Signal`] if a handler cannot be registered.
    #[cfg(unix)]
    pub fn new() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| ReloadError::signal(format!("failed to register SIGINT: {e}")))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| ReloadError::signal(format!("failed to register SIGTERM: {e}")))?;

        Ok(Self::from_future(async move {
            tokio::select! {
                _ = sigint.recv() => Ok(Signal::Int),
                _ = sigterm.recv() => Ok(Signal::Term),
            }
        }))
    }

    /// Registers the Ctrl-C handler.
    ///
    /// # Errors
    /// Never fails on this platform; registration errors surface from `run`.
    #[cfg(not(unix))]
    pub fn new() -> Result<Self> {
        Ok(Self::from_future(async {
            tokio::signal::ctrl_c()
                .await
                .map(|()| Signal::Int)
                .map_err(|e| ReloadError::signal(e.to_string()))
        }))
    }

    /// Uses an arbitrary future as the signal source.
    #[must_use]
    pub fn from_future<F>(source: F) -> Self
    where
        F: Future<Output = Result<Signal>> + Send + 'static,
    {
        Self {
            source: Box::pin(source),
            token: CancellationToken::new(),
        }
    }

    /// Returns the stop handle.
    #[must_use]
    pub fn stop_handle(&self) -> SignalInterrupter {
        SignalInterrupter {
            token: self.token.clone(),
        }
    }

    /// Waits for a signal or a stop request.
    ///
    /// # Errors
    /// Propagates an error from the signal source.
    pub async fn run(self) -> Result<()> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Ok(()),
            received = self.source => match received {
                Ok(signal) => {
                    tracing::info!(signal = ?signal, signo = signal.as_i32(), "received signal, shutting down");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "signal handling error");
                    Err(e)
                }
            },
        }
    }
}

/// Stops a [`SignalActor`].
#[derive(Debug, Clone)]
pub struct SignalInterrupter {
    token: CancellationToken,
}

impl Interrupt for SignalInterrupter {
    fn interrupt(self, _cause: &StopCause) {
        self.token.cancel();
    }
}

#[async_trait]
impl Actor for SignalActor {
    type Interrupter = SignalInterrupter;

    fn name(&self) -> &'static str {
        "signal"
    }

    fn interrupter(&self) -> Self::Interrupter {
        self.stop_handle()
    }

    async fn run(self) -> Result<()> {
        Self::run(self).await
    }
}
