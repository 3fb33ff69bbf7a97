//! HTTP handler definitions and the shared axum state.

pub mod carrier;
pub mod health;

pub use carrier::Carrier;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::service::dag::DagEnv;
use crate::service::instrument::Instrumentation;
use crate::service::worker::BackgroundExecutor;
use crate::service::ServerConfig;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Health state machine and shutdown signal.
    pub shutdown: Arc<ShutdownController>,
    /// Worker pool for background continuations.
    pub executor: Arc<BackgroundExecutor>,
    pub instrumentation: Arc<Instrumentation>,
    pub config: Arc<ServerConfig>,
    pub network: Arc<NetworkConfig>,
    /// Process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        shutdown: Arc<ShutdownController>,
        executor: Arc<BackgroundExecutor>,
        instrumentation: Arc<Instrumentation>,
        config: Arc<ServerConfig>,
        network: Arc<NetworkConfig>,
    ) -> Self {
        Self {
            shutdown,
            executor,
            instrumentation,
            config,
            network,
            start_time: Instant::now(),
        }
    }

    /// DAG environment for one request, wired to the shared executor and
    /// instrumentation.
    #[must_use]
    pub fn dag_env(&self, carrier: Carrier) -> DagEnv {
        DagEnv::new(carrier.ctx, carrier.locale)
            .with_executor(Arc::clone(&self.executor))
            .with_instrumentation(Arc::clone(&self.instrumentation))
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    AppState::new(
        Arc::new(ShutdownController::new()),
        BackgroundExecutor::spawn(1, 8),
        Arc::new(Instrumentation::standard()),
        Arc::new(ServerConfig::default()),
        Arc::new(NetworkConfig::default()),
    )
}

#[cfg(test)]
mod tests {
    use backbone_core::{Locale, RequestContext};

    use super::*;

    #[tokio::test]
    async fn dag_env_carries_shared_services() {
        let state = test_state();
        let env = state.dag_env(Carrier {
            ctx: RequestContext::new("req-7"),
            locale: Locale::new("pt"),
        });

        assert_eq!(env.ctx.request_id, "req-7");
        assert_eq!(env.locale.as_str(), "pt");
        assert!(Arc::ptr_eq(env.executor.as_ref().unwrap(), &state.executor));
        assert!(env.instrumentation.is_some());
    }
}
