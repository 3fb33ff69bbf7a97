//! Observability wrapper around use-case execution.
//!
//! Every instrumented call:
//!
//! 1. starts a span named after the operation, parented on the carrier's trace
//! 2. hands the use case a carrier whose trace identity is that span
//! 3. measures wall time with the injected [`Clock`]
//! 4. records latency plus a success or error count on the [`MetricsSink`]
//! 5. ends the span exactly once, also when the call is dropped midway
//!
//! The wrapper never flips a result from success to failure or back. The only
//! result it creates itself is the internal error returned when the body
//! panicked and produced nothing.

pub mod clock;
pub mod sink;
pub mod span;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use backbone_core::{AppStatus, Locale, RequestContext, UseCase, UseCaseResult};
use futures_util::FutureExt;
use tracing::{error, warn, Instrument};

pub use clock::{Clock, ManualClock, SystemClock};
pub use sink::{InMemoryMetrics, MetricsFacadeSink, MetricsSink, Outcome};
pub use span::{OperationSpan, RecordedSpan, RecordingTracer, SpanStatus, Tracer, TracingTracer};

/// Message of the internal error substituted for a panicked body.
pub const NO_RESULT_MESSAGE: &str = "use case produced no result";
/// Span status message of an execution dropped before it settled.
pub const CANCELLED_MESSAGE: &str = "use case cancelled before completion";

/// Tracer, metrics sink and clock used by the wrapper.
#[derive(Clone)]
pub struct Instrumentation {
    pub tracer: Arc<dyn Tracer>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

impl Instrumentation {
    #[must_use]
    pub fn new(
        tracer: Arc<dyn Tracer>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracer,
            metrics,
            clock,
        }
    }

    /// Production wiring: `tracing` spans, the `metrics` facade, system time.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            Arc::new(TracingTracer),
            Arc::new(MetricsFacadeSink),
            Arc::new(SystemClock),
        )
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation").finish_non_exhaustive()
    }
}

/// Runs `use_case` under a span named after [`UseCase::name`].
pub async fn instrument_use_case<U: UseCase>(
    use_case: &U,
    ctx: &RequestContext,
    locale: &Locale,
    input: U::Input,
    instrumentation: &Instrumentation,
) -> UseCaseResult<U::Output> {
    run_instrumented(use_case.name(), false, use_case, ctx, locale, input, instrumentation).await
}

/// Runs one DAG step under a span named after the step, tagged with the use case.
pub async fn instrument_dag_step<U: UseCase>(
    step_name: &'static str,
    use_case: &U,
    ctx: &RequestContext,
    locale: &Locale,
    input: U::Input,
    instrumentation: &Instrumentation,
) -> UseCaseResult<U::Output> {
    run_instrumented(step_name, true, use_case, ctx, locale, input, instrumentation).await
}

async fn run_instrumented<U: UseCase>(
    operation: &'static str,
    dag_step: bool,
    use_case: &U,
    ctx: &RequestContext,
    locale: &Locale,
    input: U::Input,
    instrumentation: &Instrumentation,
) -> UseCaseResult<U::Output> {
    let mut span = instrumentation.tracer.start_span(operation, &ctx.trace);
    span.set_attribute("request_id", ctx.request_id.clone());
    if dag_step {
        span.set_attribute("dag.step", operation.to_string());
        span.set_attribute("use_case", use_case.name().to_string());
    }

    let nested = ctx.with_trace(span.trace_context());
    let run = use_case
        .execute(&nested, locale, input)
        .instrument(span.tracing_span());
    let guard = SpanGuard::start(operation, span, instrumentation);
    let produced = AssertUnwindSafe(run).catch_unwind().await;

    let (result, outcome) = match produced {
        Ok(result) if !result.is_terminal() => (result, Outcome::NoResult),
        Ok(result) if result.has_error() => (result, Outcome::Error),
        Ok(result) => (result, Outcome::Success),
        Err(_) => {
            error!(operation, request_id = %ctx.request_id, "use case panicked");
            (
                UseCaseResult::failure(AppStatus::InternalError, NO_RESULT_MESSAGE),
                Outcome::NoResult,
            )
        }
    };

    let status = match outcome {
        Outcome::Success => SpanStatus::Ok,
        Outcome::Error => SpanStatus::Error(
            result
                .error()
                .map(|err| err.message.clone())
                .unwrap_or_default(),
        ),
        Outcome::NoResult => SpanStatus::Error(NO_RESULT_MESSAGE.to_string()),
    };
    guard.finish(outcome, status, result.status());

    result
}

/// Owns a live span until the execution settles.
///
/// If the instrumented future is dropped before it settles (request timeout,
/// `tokio::time::timeout`, a cancelled `select!` branch), `Drop` closes the
/// span as cancelled and records a `NoResult` outcome.
struct SpanGuard<'a> {
    operation: &'static str,
    span: Option<Box<dyn OperationSpan>>,
    started: Instant,
    instrumentation: &'a Instrumentation,
}

impl<'a> SpanGuard<'a> {
    fn start(
        operation: &'static str,
        span: Box<dyn OperationSpan>,
        instrumentation: &'a Instrumentation,
    ) -> Self {
        Self {
            operation,
            span: Some(span),
            started: instrumentation.clock.now(),
            instrumentation,
        }
    }

    fn finish(mut self, outcome: Outcome, status: SpanStatus, app_status: Option<AppStatus>) {
        if let Some(mut span) = self.span.take() {
            if let Some(app_status) = app_status {
                span.set_attribute("status", app_status.as_str().to_string());
            }
            self.close(span, outcome, status);
        }
    }

    fn close(&self, mut span: Box<dyn OperationSpan>, outcome: Outcome, status: SpanStatus) {
        let elapsed = self
            .instrumentation
            .clock
            .now()
            .saturating_duration_since(self.started);
        let metrics = &self.instrumentation.metrics;
        metrics.record_latency(self.operation, elapsed);
        metrics.record_outcome(self.operation, outcome);
        span.set_status(status);
        span.end(elapsed);
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            warn!(operation = self.operation, "use case cancelled before completion");
            self.close(
                span,
                Outcome::NoResult,
                SpanStatus::Error(CANCELLED_MESSAGE.to_string()),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Instrumented
// ---------------------------------------------------------------------------

/// Use case decorator that instruments every call of `inner`.
pub struct Instrumented<U> {
    inner: U,
    instrumentation: Arc<Instrumentation>,
}

impl<U: UseCase> Instrumented<U> {
    #[must_use]
    pub fn new(inner: U, instrumentation: Arc<Instrumentation>) -> Self {
        Self {
            inner,
            instrumentation,
        }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

#[async_trait]
impl<U: UseCase> UseCase for Instrumented<U> {
    type Input = U::Input;
    type Output = U::Output;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn set_locale(&mut self, locale: &Locale) {
        self.inner.set_locale(locale);
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        locale: &Locale,
        input: Self::Input,
    ) -> UseCaseResult<Self::Output> {
        instrument_use_case(&self.inner, ctx, locale, input, &self.instrumentation).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use backbone_core::{TraceContext, UseCaseError};
    use parking_lot::Mutex;

    use super::*;

    enum Behavior {
        Succeed,
        Fail,
        Pending,
        Panic,
        Hang,
    }

    struct FetchProfile {
        behavior: Behavior,
        clock: ManualClock,
        seen_trace: Mutex<Option<TraceContext>>,
    }

    impl FetchProfile {
        fn new(behavior: Behavior, clock: &ManualClock) -> Self {
            Self {
                behavior,
                clock: clock.clone(),
                seen_trace: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl UseCase for FetchProfile {
        type Input = String;
        type Output = String;

        fn name(&self) -> &'static str {
            "fetch_profile"
        }

        fn set_locale(&mut self, _locale: &Locale) {}

        async fn execute(
            &self,
            ctx: &RequestContext,
            _locale: &Locale,
            user_id: String,
        ) -> UseCaseResult<String> {
            *self.seen_trace.lock() = Some(ctx.trace.clone());
            self.clock.advance(Duration::from_millis(40));
            match self.behavior {
                Behavior::Succeed => UseCaseResult::success(AppStatus::Success, user_id),
                Behavior::Fail => UseCaseError::not_found("profile.missing").into(),
                Behavior::Pending => UseCaseResult::new(),
                Behavior::Panic => panic!("profile store exploded"),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    struct Harness {
        tracer: RecordingTracer,
        metrics: InMemoryMetrics,
        clock: ManualClock,
        instrumentation: Instrumentation,
    }

    fn harness() -> Harness {
        let tracer = RecordingTracer::new();
        let metrics = InMemoryMetrics::new();
        let clock = ManualClock::new();
        let instrumentation = Instrumentation::new(
            Arc::new(tracer.clone()),
            Arc::new(metrics.clone()),
            Arc::new(clock.clone()),
        );
        Harness {
            tracer,
            metrics,
            clock,
            instrumentation,
        }
    }

    async fn run(h: &Harness, behavior: Behavior) -> UseCaseResult<String> {
        let use_case = FetchProfile::new(behavior, &h.clock);
        instrument_use_case(
            &use_case,
            &RequestContext::new("req-1"),
            &Locale::default(),
            "u1".to_string(),
            &h.instrumentation,
        )
        .await
    }

    #[tokio::test]
    async fn success_records_latency_and_success_counter() {
        let h = harness();
        let result = run(&h, Behavior::Succeed).await;

        assert_eq!(result.data(), Some(&"u1".to_string()));
        assert_eq!(h.metrics.successes("fetch_profile"), 1);
        assert_eq!(h.metrics.errors("fetch_profile"), 0);
        assert_eq!(
            h.metrics.latencies("fetch_profile"),
            vec![Duration::from_millis(40)]
        );

        let span = h.tracer.span("fetch_profile").unwrap();
        assert_eq!(span.end_count, 1);
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.duration, Some(Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn error_is_passed_through_and_counted() {
        let h = harness();
        let result = run(&h, Behavior::Fail).await;

        assert_eq!(result.status(), Some(AppStatus::NotFound));
        assert_eq!(h.metrics.count("fetch_profile", Outcome::Error), 1);

        let span = h.tracer.span("fetch_profile").unwrap();
        assert_eq!(span.end_count, 1);
        assert_eq!(span.status, SpanStatus::Error("profile.missing".into()));
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let h = harness();
        let result = run(&h, Behavior::Panic).await;

        assert_eq!(result.status(), Some(AppStatus::InternalError));
        assert_eq!(result.error().unwrap().message, NO_RESULT_MESSAGE);
        assert_eq!(h.metrics.count("fetch_profile", Outcome::NoResult), 1);
        assert_eq!(h.tracer.span("fetch_profile").unwrap().end_count, 1);
    }

    #[tokio::test]
    async fn pending_result_is_returned_unchanged_but_counted_as_no_result() {
        let h = harness();
        let result = run(&h, Behavior::Pending).await;

        assert!(!result.is_terminal());
        assert!(!result.has_error());
        assert_eq!(h.metrics.count("fetch_profile", Outcome::NoResult), 1);
        assert_eq!(h.metrics.successes("fetch_profile"), 0);
        assert_eq!(h.tracer.span("fetch_profile").unwrap().end_count, 1);
    }

    #[tokio::test]
    async fn dropped_execution_still_ends_span_once() {
        let h = harness();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), run(&h, Behavior::Hang)).await;
        assert!(timed_out.is_err());

        let span = h.tracer.span("fetch_profile").unwrap();
        assert_eq!(span.end_count, 1);
        assert_eq!(span.status, SpanStatus::Error(CANCELLED_MESSAGE.into()));
        assert_eq!(span.duration, Some(Duration::from_millis(40)));
        assert_eq!(h.metrics.count("fetch_profile", Outcome::NoResult), 1);
        assert_eq!(h.metrics.successes("fetch_profile"), 0);
        assert_eq!(
            h.metrics.latencies("fetch_profile"),
            vec![Duration::from_millis(40)]
        );
    }

    #[tokio::test]
    async fn body_sees_span_trace_identity() {
        let h = harness();
        let use_case = FetchProfile::new(Behavior::Succeed, &h.clock);
        let mut ctx = RequestContext::new("req-9");
        ctx.trace = TraceContext {
            trace_id: "upstream-trace".into(),
            span_id: Some("upstream-span".into()),
        };

        instrument_use_case(&use_case, &ctx, &Locale::default(), "u9".into(), &h.instrumentation)
            .await;

        let seen = use_case.seen_trace.lock().clone().unwrap();
        let span = h.tracer.span("fetch_profile").unwrap();
        assert_eq!(seen.trace_id, "upstream-trace");
        assert_eq!(seen.span_id.as_deref(), Some(span.span_id.as_str()));
        assert_eq!(span.parent_span_id.as_deref(), Some("upstream-span"));
        // The caller's carrier is left untouched.
        assert_eq!(ctx.trace.span_id.as_deref(), Some("upstream-span"));
    }

    #[tokio::test]
    async fn dag_step_span_is_named_after_step() {
        let h = harness();
        let use_case = FetchProfile::new(Behavior::Succeed, &h.clock);
        instrument_dag_step(
            "load_profile",
            &use_case,
            &RequestContext::new("req-2"),
            &Locale::default(),
            "u2".into(),
            &h.instrumentation,
        )
        .await;

        let span = h.tracer.span("load_profile").unwrap();
        assert!(span
            .attributes
            .contains(&("use_case", "fetch_profile".to_string())));
        assert_eq!(h.metrics.successes("load_profile"), 1);
    }

    #[tokio::test]
    async fn instrumented_wrapper_delegates() {
        let h = harness();
        let wrapped = Instrumented::new(
            FetchProfile::new(Behavior::Succeed, &h.clock),
            Arc::new(h.instrumentation.clone()),
        );
        assert_eq!(wrapped.name(), "fetch_profile");

        let result = wrapped
            .execute(&RequestContext::new("r"), &Locale::default(), "u3".into())
            .await;
        assert!(result.is_success());
        assert_eq!(h.metrics.successes("fetch_profile"), 1);
        assert_eq!(wrapped.inner().name(), "fetch_profile");
    }
}
