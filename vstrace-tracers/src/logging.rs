//! A tracer that logs every call instead of shipping anything anywhere.
//! Useful for local development and for `VS_TRACER_BACKEND=logging`, the
//! default.

use std::sync::Arc;

use vstrace_api::{Closer, KeyValue, NoopCloser, Span, SpanContext, StartSpanOptions, Tracer, TracerProvider};

#[derive(Debug)]
struct LoggingSpanContext {
    id: String,
}

impl SpanContext for LoggingSpanContext {
    fn trace_id_hex(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug)]
struct LoggingSpan {
    operation_name: String,
    context: Arc<dyn SpanContext>,
}

impl Span for LoggingSpan {
    fn set_tag(&self, tag: KeyValue) {
        tracing::info!(operation_name = %self.operation_name, tag.key = %tag.key, tag.value = %tag.value, "span.SetTag()");
    }

    fn context(&self) -> Arc<dyn SpanContext> {
        Arc::clone(&self.context)
    }

    fn finish(self: Box<Self>, duration_override: Option<std::time::Duration>) {
        tracing::info!(operation_name = %self.operation_name, duration_ms = duration_override.map(|d| d.as_millis()), "span.Finish()");
    }
}

#[derive(Debug, Default)]
pub struct LoggingTracer;

impl Tracer for LoggingTracer {
    fn start_span(&self, operation_name: &str, opts: StartSpanOptions) -> Box<dyn Span> {
        let parent_hex = opts.parent.as_ref().map(|p| p.trace_id_hex());
        tracing::info!(operation_name, parent = ?parent_hex, "tracer.StartSpan()");
        Box::new(LoggingSpan {
            operation_name: operation_name.to_string(),
            context: Arc::new(LoggingSpanContext { id: uuid::Uuid::new_v4().to_string() }),
        })
    }
}

/// Hands out a shared [`LoggingTracer`] with a no-op closer.
#[derive(Debug, Default)]
pub struct LoggingTracerProvider;

impl TracerProvider for LoggingTracerProvider {
    fn tracer(&self, service_name: &str) -> (Box<dyn Tracer>, Box<dyn Closer>) {
        tracing::debug!(service_name, "logging tracer provider: issuing tracer");
        (Box::new(LoggingTracer), Box::new(NoopCloser))
    }
}
