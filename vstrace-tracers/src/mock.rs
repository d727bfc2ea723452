//! In-memory tracer for tests, with HTTP-introspectable finished spans.
//!
//! Mirrors the original's `httpmocktracer`: a single shared tracer collects
//! every finished span, a `reset` call clears the collection, and
//! `finished_spans` serializes it for the `/mocktracer/*` endpoints
//! `vstrace-server` exposes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use vstrace_api::{Closer, KeyValue, NoopCloser, Span, SpanContext, StartSpanOptions, Tracer, TracerProvider, Value};

#[derive(Debug)]
struct MockSpanContext {
    id: String,
}

impl SpanContext for MockSpanContext {
    fn trace_id_hex(&self) -> String {
        self.id.clone()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanInfo {
    pub operation_name: String,
    pub parent: Option<String>,
    pub duration_ms: Option<u128>,
}

/// Matches the `{span, tags}` shape the original's `httpmocktracer` renders
/// at `/mocktracer/finished-spans`.
#[derive(Clone, Debug, Serialize)]
pub struct FinishedSpan {
    pub span: SpanInfo,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug)]
struct MockSpan {
    operation_name: String,
    parent: Option<String>,
    context: Arc<dyn SpanContext>,
    tags: Mutex<BTreeMap<String, String>>,
    sink: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl Span for MockSpan {
    fn set_tag(&self, tag: KeyValue) {
        self.tags.lock().unwrap().insert(tag.key.to_string(), format_value(&tag.value));
    }

    fn context(&self) -> Arc<dyn SpanContext> {
        Arc::clone(&self.context)
    }

    fn finish(self: Box<Self>, duration_override: Option<Duration>) {
        let finished = FinishedSpan {
            span: SpanInfo {
                operation_name: self.operation_name,
                parent: self.parent,
                duration_ms: duration_override.map(|d| d.as_millis()),
            },
            tags: self.tags.into_inner().unwrap(),
        };
        self.sink.lock().unwrap().push(finished);
    }
}

fn format_value(value: &Value) -> String {
    value.to_string()
}

/// A [`Tracer`] backed by a shared in-memory sink of finished spans.
#[derive(Debug)]
pub struct MockTracer {
    sink: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl Tracer for MockTracer {
    fn start_span(&self, operation_name: &str, opts: StartSpanOptions) -> Box<dyn Span> {
        let parent = opts.parent.as_ref().map(|p| p.trace_id_hex());
        Box::new(MockSpan {
            operation_name: operation_name.to_string(),
            parent,
            context: Arc::new(MockSpanContext { id: uuid::Uuid::new_v4().to_string() }),
            tags: Mutex::new(BTreeMap::new()),
            sink: Arc::clone(&self.sink),
        })
    }
}

/// Owns the shared sink of finished spans across every [`MockTracer`] it
/// hands out. `vstrace-server` holds one instance and wires `reset` /
/// `finished_spans` to `/mocktracer/reset` and `/mocktracer/finished-spans`.
#[derive(Clone, Debug, Default)]
pub struct MockTracerProvider {
    sink: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl MockTracerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.sink.lock().unwrap().clear();
    }

    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.sink.lock().unwrap().clone()
    }
}

impl TracerProvider for MockTracerProvider {
    fn tracer(&self, _service_name: &str) -> (Box<dyn Tracer>, Box<dyn Closer>) {
        (Box::new(MockTracer { sink: Arc::clone(&self.sink) }), Box::new(NoopCloser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_records_tags_and_duration() {
        let provider = MockTracerProvider::new();
        let (tracer, _closer) = provider.tracer("github");
        let span = tracer.start_span("issue", StartSpanOptions::default());
        span.set_tag(KeyValue::new("repo", "acme/widget"));
        span.finish(Some(Duration::from_millis(42)));

        let spans = provider.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span.operation_name, "issue");
        assert_eq!(spans[0].tags.get("repo").unwrap(), "acme/widget");
        assert_eq!(spans[0].span.duration_ms, Some(42));
    }

    #[test]
    fn reset_clears_collection() {
        let provider = MockTracerProvider::new();
        let (tracer, _closer) = provider.tracer("github");
        tracer.start_span("issue", StartSpanOptions::default()).finish(None);
        assert_eq!(provider.finished_spans().len(), 1);
        provider.reset();
        assert!(provider.finished_spans().is_empty());
    }
}
