//! HTTP middleware for the transport adapter.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use tower::{Layer, Service, ServiceBuilder};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use super::config::NetworkConfig;
use crate::service::worker::BackgroundExecutor;

/// Header carrying the request id, reused as the use-case carrier id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                TraceLayer<
                    tower_http::classify::SharedClassifier<
                        tower_http::classify::ServerErrorsAsFailures,
                    >,
                >,
                tower::layer::util::Stack<
                    SetRequestIdLayer<MakeRequestUuid>,
                    tower::layer::util::Identity,
                >,
            >,
        >,
    >,
>;

/// Builds the transport middleware stack.
///
/// **Ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 `X-Request-Id` when the caller sent none
/// 2. `Tracing` -- request/response spans
/// 3. `CORS` -- configured origin allowlist
/// 4. `Timeout` -- bounds request processing time
/// 5. `PropagateRequestId` -- echoes `X-Request-Id` on the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// A `"*"` entry allows any origin; otherwise only the parsable entries.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

// ---------------------------------------------------------------------------
// DrainPendingLayer
// ---------------------------------------------------------------------------

/// Holds every response until the background executor has no pending work.
///
/// Used in serverless mode, where the platform may freeze the process as soon
/// as the response is sent.
#[derive(Debug, Clone)]
pub struct DrainPendingLayer {
    executor: Arc<BackgroundExecutor>,
}

impl DrainPendingLayer {
    #[must_use]
    pub fn new(executor: Arc<BackgroundExecutor>) -> Self {
        Self { executor }
    }
}

impl<S> Layer<S> for DrainPendingLayer {
    type Service = DrainPending<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DrainPending {
            inner,
            executor: Arc::clone(&self.executor),
        }
    }
}

/// Service produced by [`DrainPendingLayer`].
#[derive(Debug, Clone)]
pub struct DrainPending<S> {
    inner: S,
    executor: Arc<BackgroundExecutor>,
}

impl<S, Req> Service<Req> for DrainPending<S>
where
    S: Service<Req> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let fut = self.inner.call(req);
        let executor = Arc::clone(&self.executor);

        Box::pin(async move {
            let response = fut.await;
            let pending = executor.pending_tasks();
            if pending > 0 {
                debug!(pending, "holding response until background work drains");
            }
            executor.wait_for_pending_tasks().await;
            response
        })
    }
}
