//! Span abstraction used by the instrumentation wrapper.
//!
//! [`TracingTracer`] maps spans onto the `tracing` crate so they flow through
//! whatever subscriber the binary installed. [`RecordingTracer`] keeps every
//! span in memory for assertions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backbone_core::TraceContext;
use parking_lot::Mutex;
use tracing::{info, info_span};
use uuid::Uuid;

/// Final status attached to a span before it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

impl SpanStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Ok => "ok",
            Self::Error(_) => "error",
        }
    }
}

/// One live span. `end` consumes it, so a span cannot end twice.
pub trait OperationSpan: Send {
    /// Trace identity nested operations should inherit.
    fn trace_context(&self) -> TraceContext;

    fn set_attribute(&mut self, key: &'static str, value: String);

    fn set_status(&mut self, status: SpanStatus);

    /// `tracing` span to enter while the operation runs.
    fn tracing_span(&self) -> tracing::Span {
        tracing::Span::none()
    }

    fn end(self: Box<Self>, elapsed: Duration);
}

/// Starts spans as children of a carrier's trace identity.
pub trait Tracer: Send + Sync + 'static {
    fn start_span(&self, name: &'static str, parent: &TraceContext) -> Box<dyn OperationSpan>;
}

// ---------------------------------------------------------------------------
// TracingTracer
// ---------------------------------------------------------------------------

/// Tracer that emits `tracing` spans with uuid trace/span identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn start_span(&self, name: &'static str, parent: &TraceContext) -> Box<dyn OperationSpan> {
        let trace_id = if parent.trace_id.is_empty() {
            Uuid::new_v4().simple().to_string()
        } else {
            parent.trace_id.clone()
        };
        let span_id = Uuid::new_v4().simple().to_string()[..16].to_string();

        let span = info_span!(
            "use_case",
            operation = name,
            trace_id = %trace_id,
            span_id = %span_id,
            parent_span_id = parent.span_id.as_deref().unwrap_or(""),
        );

        Box::new(TracingSpan {
            name,
            span,
            trace: TraceContext {
                trace_id,
                span_id: Some(span_id),
            },
            attributes: Vec::new(),
            status: SpanStatus::Unset,
        })
    }
}

struct TracingSpan {
    name: &'static str,
    span: tracing::Span,
    trace: TraceContext,
    attributes: Vec<(&'static str, String)>,
    status: SpanStatus,
}

impl OperationSpan for TracingSpan {
    fn trace_context(&self) -> TraceContext {
        self.trace.clone()
    }

    fn set_attribute(&mut self, key: &'static str, value: String) {
        self.attributes.push((key, value));
    }

    fn set_status(&mut self, status: SpanStatus) {
        self.status = status;
    }

    fn tracing_span(&self) -> tracing::Span {
        self.span.clone()
    }

    fn end(self: Box<Self>, elapsed: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = elapsed.as_millis() as u64;
        let error = match &self.status {
            SpanStatus::Error(message) => message.as_str(),
            _ => "",
        };
        info!(
            parent: &self.span,
            operation = self.name,
            status = self.status.as_str(),
            error,
            duration_ms,
            attributes = ?self.attributes,
            "use case finished"
        );
    }
}

// ---------------------------------------------------------------------------
// RecordingTracer
// ---------------------------------------------------------------------------

/// Snapshot of one span captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSpan {
    pub name: &'static str,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub attributes: Vec<(&'static str, String)>,
    pub status: SpanStatus,
    pub duration: Option<Duration>,
    pub end_count: u32,
}

/// In-memory tracer with sequential ids (`trace-1`, `span-1`, ...).
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().clone()
    }

    /// First span recorded under `name`.
    #[must_use]
    pub fn span(&self, name: &str) -> Option<RecordedSpan> {
        self.spans.lock().iter().find(|s| s.name == name).cloned()
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, name: &'static str, parent: &TraceContext) -> Box<dyn OperationSpan> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let trace_id = if parent.trace_id.is_empty() {
            format!("trace-{id}")
        } else {
            parent.trace_id.clone()
        };
        let span_id = format!("span-{id}");

        let mut spans = self.spans.lock();
        let index = spans.len();
        spans.push(RecordedSpan {
            name,
            trace_id: trace_id.clone(),
            span_id: span_id.clone(),
            parent_span_id: parent.span_id.clone(),
            attributes: Vec::new(),
            status: SpanStatus::Unset,
            duration: None,
            end_count: 0,
        });

        Box::new(RecordingSpan {
            spans: Arc::clone(&self.spans),
            index,
            trace: TraceContext {
                trace_id,
                span_id: Some(span_id),
            },
        })
    }
}

struct RecordingSpan {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
    index: usize,
    trace: TraceContext,
}

impl OperationSpan for RecordingSpan {
    fn trace_context(&self) -> TraceContext {
        self.trace.clone()
    }

    fn set_attribute(&mut self, key: &'static str, value: String) {
        if let Some(span) = self.spans.lock().get_mut(self.index) {
            span.attributes.push((key, value));
        }
    }

    fn set_status(&mut self, status: SpanStatus) {
        if let Some(span) = self.spans.lock().get_mut(self.index) {
            span.status = status;
        }
    }

    fn end(self: Box<Self>, elapsed: Duration) {
        if let Some(span) = self.spans.lock().get_mut(self.index) {
            span.duration = Some(elapsed);
            span.end_count += 1;
        }
    }
}
