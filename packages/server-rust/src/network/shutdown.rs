//! Graceful shutdown controller.
//!
//! Uses `ArcSwap` for lock-free health state transitions. Draining waits for
//! the background executor's pending counter instead of tracking requests, so
//! fire-and-forget work started by the last requests still completes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::service::worker::BackgroundExecutor;

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Not yet accepting requests.
    Starting,
    Ready,
    /// No new requests; background work is finishing.
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Coordinates health reporting and the shutdown sequence.
///
/// 1. Health probes read `health_state()`
/// 2. `trigger_shutdown()` moves to Draining and wakes every
///    `shutdown_requested()` future (the HTTP server stops accepting)
/// 3. `drain()` waits for background work and moves to Stopped
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    health_state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Future that resolves once [`Self::trigger_shutdown`] has been called,
    /// including a call made before the future was created.
    pub fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_signal.subscribe();
        async move {
            // The sender lives as long as the controller.
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Moves to `Draining` and signals every shutdown receiver.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        // Receivers may have been dropped.
        let _ = self.shutdown_signal.send(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Triggers shutdown, then waits up to `timeout` for pending background
    /// tasks to finish.
    ///
    /// Returns `true` (and moves to `Stopped`) if the work drained in time.
    /// On timeout the state stays `Draining`.
    pub async fn drain(&self, executor: &BackgroundExecutor, timeout: Duration) -> bool {
        self.trigger_shutdown();

        let pending = executor.pending_tasks();
        if pending > 0 {
            info!(pending, "waiting for background tasks to finish");
        }

        if executor.wait_for_pending_tasks_timeout(timeout).await {
            self.health_state.store(Arc::new(HealthState::Stopped));
            info!("background work drained");
            true
        } else {
            warn!(
                pending = executor.pending_tasks(),
                "drain timeout expired with background tasks remaining"
            );
            false
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
