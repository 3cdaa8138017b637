//! Asynchronous notification dispatcher.
//!
//! Every submitted event runs on its own tokio task (filter, render, send).
//! There is no bound on concurrent sends and no retry. The dispatcher only
//! tracks how many tasks are still running so that shutdown can wait for
//! them, up to [`SHUTDOWN_TIMEOUT`].

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use super::render::{RenderError, Renderer};
use super::{MailError, MailTransport};
use crate::config::SmtpConfig;
use crate::error::panic_message;
use crate::models::{should_notify, BuildEvent};

/// Upper bound on how long shutdown waits for in-flight notifications
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Outcomes / Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to render notification for build #{build_number}: {source}")]
    Render {
        build_number: i64,
        #[source]
        source: RenderError,
    },

    #[error("failed to deliver notification for build #{build_number} to {to}: {source}")]
    Delivery {
        build_number: i64,
        to: String,
        #[source]
        source: MailError,
    },
}

/// What happened to an event handed to [`Dispatcher::deliver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The event is not a build failure; nothing was rendered or sent
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Drained,
    /// The wait expired; these tasks keep running in the background
    TimedOut { in_flight: usize },
}

// =============================================================================
// Async Notifier Trait
// =============================================================================

/// Fire-and-forget entry point used by the webhook handler
pub trait AsyncNotifier: Send + Sync {
    fn submit(&self, event: BuildEvent);
}

// =============================================================================
// Dispatcher
// =============================================================================

#[derive(Debug, Default)]
struct DispatcherState {
    closed: bool,
    in_flight: usize,
}

struct Inner {
    renderer: Renderer,
    transport: Arc<dyn MailTransport>,
    config: Arc<SmtpConfig>,
    state: Mutex<DispatcherState>,
    idle: Notify,
    /// Runtime the notification tasks are spawned on
    runtime: Handle,
}

impl Inner {
    // The state is two plain counters, so a poisoned lock is still usable.
    fn state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases an in-flight slot when the task finishes, panics included
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = {
            let mut state = self.inner.state();
            state.in_flight -= 1;
            state.in_flight
        };
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Owns notification fan-out and shutdown coordination.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher that spawns onto the current tokio runtime.
    ///
    /// Must be called from the runtime that outlives request handling (the
    /// one `main` runs on), not from an HTTP worker: worker runtimes are torn
    /// down when the server stops, which would cancel in-flight sends.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        renderer: Renderer,
        transport: Arc<dyn MailTransport>,
        config: Arc<SmtpConfig>,
    ) -> Self {
        Self::with_runtime(renderer, transport, config, Handle::current())
    }

    /// Creates a dispatcher that spawns notification tasks on `runtime`.
    pub fn with_runtime(
        renderer: Renderer,
        transport: Arc<dyn MailTransport>,
        config: Arc<SmtpConfig>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                renderer,
                transport,
                config,
                state: Mutex::new(DispatcherState::default()),
                idle: Notify::new(),
                runtime,
            }),
        }
    }

    /// Number of notification tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.inner.state().in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    /// Reserves an in-flight slot unless shutdown has started
    fn admit(&self) -> Option<InFlightGuard> {
        let mut state = self.inner.state();
        if state.closed {
            return None;
        }
        state.in_flight += 1;
        Some(InFlightGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Queues the event for background delivery and returns immediately.
    ///
    /// After shutdown has started the event is dropped silently. Errors
    /// and panics in the background task are logged, never propagated.
    pub fn submit(&self, event: BuildEvent) {
        let Some(guard) = self.admit() else {
            log::debug!(
                "Dispatcher closed, dropping event for build {:?}",
                event.build_number()
            );
            return;
        };

        let dispatcher = self.clone();
        self.inner.runtime.spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(dispatcher.deliver(&event))
                .catch_unwind()
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::error!("{}", e),
                Err(panic) => log::error!(
                    "Notification task for build {:?} panicked: {}",
                    event.build_number(),
                    panic_message(panic.as_ref())
                ),
            }
        });
    }

    /// Runs filter, render and send inline and reports the outcome.
    pub async fn deliver(&self, event: &BuildEvent) -> Result<Delivery, NotifyError> {
        let build_number = match &event.build {
            Some(build) if should_notify(event) => build.number,
            _ => {
                log::debug!(
                    "Ignoring {:?}/{:?} event for build {:?}",
                    event.event,
                    event.action,
                    event.build_number()
                );
                return Ok(Delivery::Skipped);
            }
        };

        let message = self
            .inner
            .renderer
            .render(event, &self.inner.config)
            .map_err(|source| NotifyError::Render {
                build_number,
                source,
            })?;

        self.inner
            .transport
            .send(&message)
            .await
            .map_err(|source| NotifyError::Delivery {
                build_number,
                to: message.to.to_string(),
                source,
            })?;

        log::info!(
            "Sent failure notification for build #{} to {}",
            build_number,
            message.to
        );
        Ok(Delivery::Sent)
    }

    /// Stops accepting work and waits for in-flight notifications.
    ///
    /// Safe to call more than once. Waits at most [`SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(&self) -> ShutdownOutcome {
        self.shutdown_within(SHUTDOWN_TIMEOUT).await
    }

    /// Same as [`shutdown`](Self::shutdown) with a caller-chosen bound.
    pub async fn shutdown_within(&self, timeout: Duration) -> ShutdownOutcome {
        let pending = {
            let mut state = self.inner.state();
            if !state.closed {
                state.closed = true;
                log::info!(
                    "Dispatcher closed, waiting for {} in-flight notification(s)",
                    state.in_flight
                );
            }
            state.in_flight
        };
        if pending == 0 {
            return ShutdownOutcome::Drained;
        }

        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => {
                log::info!("All in-flight notifications finished");
                ShutdownOutcome::Drained
            }
            Err(_) => {
                let in_flight = self.in_flight();
                log::warn!(
                    "Timed out after {:?} waiting for notifications, {} still in flight",
                    timeout,
                    in_flight
                );
                ShutdownOutcome::TimedOut { in_flight }
            }
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between the check and
            // the await is not lost.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl AsyncNotifier for Dispatcher {
    fn submit(&self, event: BuildEvent) {
        Dispatcher::submit(self, event)
    }
}
