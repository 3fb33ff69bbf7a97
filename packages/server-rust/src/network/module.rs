//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. Application routes are supplied to `serve()` so the caller
//! can build them against the shared state in between.

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{health_handler, liveness_handler, readiness_handler, AppState};
use super::middleware::{build_http_layers, DrainPendingLayer};
use super::shutdown::ShutdownController;
use crate::service::instrument::Instrumentation;
use crate::service::worker::BackgroundExecutor;
use crate::service::ServerConfig;

/// Owns the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shared state (shutdown controller)
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts requests until shutdown, then drains background work
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        server_config: Arc<ServerConfig>,
        executor: Arc<BackgroundExecutor>,
        instrumentation: Arc<Instrumentation>,
    ) -> Self {
        let state = AppState::new(
            Arc::new(ShutdownController::new()),
            executor,
            instrumentation,
            server_config,
            Arc::new(config.clone()),
        );
        Self {
            config,
            listener: None,
            state,
        }
    }

    /// Shared state handed to every handler; use it to build application routes.
    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Merges `routes` with the health endpoints and applies the middleware.
    ///
    /// Built-in routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    ///
    /// In serverless mode every response waits for pending background work.
    /// The drain layer wraps the whole HTTP stack, so the request timeout
    /// bounds the handler only and never cuts the drain short.
    pub fn build_router(&self, routes: Router<AppState>) -> Router {
        let mut router = routes
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config));

        if self.config.serverless {
            router = router.layer(DrainPendingLayer::new(Arc::clone(&self.state.executor)));
        }

        router.with_state(self.state.clone())
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, serverless = self.config.serverless, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves or the controller's
    /// `trigger_shutdown()` is called.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining while in-flight requests finish
    /// 2. Waits up to the configured drain timeout for background work
    /// 3. Health state transitions to Stopped if the work drained
    ///
    /// Returns whether background work drained in time. On `false` the caller
    /// should stop the executor forcefully instead of waiting on it again.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        routes: Router<AppState>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<bool> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router(routes);
        let controller = self.shutdown_controller();

        controller.set_ready();
        info!("serving HTTP requests");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(Arc::clone(&controller), shutdown))
            .await?;

        let drained = controller
            .drain(&self.state.executor, self.state.config.drain_timeout())
            .await;
        Ok(drained)
    }
}

/// Resolves when either `external` fires or the controller is triggered
/// directly. Readiness flips to Draining before axum starts its graceful
/// shutdown.
fn shutdown_signal(
    controller: Arc<ShutdownController>,
    external: impl Future<Output = ()> + Send + 'static,
) -> impl Future<Output = ()> + Send + 'static {
    let requested = controller.shutdown_requested();
    async move {
        tokio::select! {
            () = external => {
                info!("shutdown requested");
                controller.trigger_shutdown();
            }
            () = requested => {}
        }
    }
}
