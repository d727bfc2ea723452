//! Tracer/Span/TracerProvider contracts.
//!
//! This is a deliberately narrow slice of the OpenTelemetry trace API: a
//! [`TracerProvider`] hands out [`Tracer`]s, a `Tracer` opens [`Span`]s, and a
//! `Span` accepts tags and a terminal finish. There is no W3C `tracestate`,
//! no baggage, and no sampler configuration — the correlation engine only
//! ever needs `StartSpan` / `SetTag` / `Finish`, exactly as the value-stream
//! tracer contract this crate descends from.

use crate::KeyValue;
use std::fmt;
use std::sync::Arc;

/// An opaque reference to an already-opened span, used purely to express
/// parentage. The span store clones this out of a held entry (an `Arc`
/// clone, never a borrow) so it can be handed to a child's `start_span`
/// after the store's mutex has already been released.
pub trait SpanContext: fmt::Debug + Send + Sync {
    /// Returns a backend-specific identifier for this context, used only
    /// for logging/debugging. Never parsed.
    fn trace_id_hex(&self) -> String;
}

/// A single open span. `finish` consumes the span; once finished a span
/// must not be tagged again.
pub trait Span: fmt::Debug + Send + Sync {
    /// Attach a tag. May be called any number of times before `finish`.
    fn set_tag(&self, tag: KeyValue);

    /// This span's context, used to parent children. Cheap: an `Arc` clone.
    fn context(&self) -> Arc<dyn SpanContext>;

    /// Finish the span, optionally back-dating the end timestamp by a
    /// known duration (preferred over wall-clock `now()` when the source
    /// reported authoritative timings).
    fn finish(self: Box<Self>, duration_override: Option<std::time::Duration>);
}

/// Options passed to [`Tracer::start_span`].
#[derive(Default)]
pub struct StartSpanOptions {
    /// The parent context, if the event resolved one against the span store.
    pub parent: Option<Arc<dyn SpanContext>>,
}

/// Produces [`Span`]s for one source. A `Tracer` is internally
/// thread-safe: the pipeline shares one per source across all concurrent
/// requests.
pub trait Tracer: fmt::Debug + Send + Sync {
    /// Start a new span, optionally as a child of `opts.parent`.
    fn start_span(&self, operation_name: &str, opts: StartSpanOptions) -> Box<dyn Span>;
}

/// A releasable resource paired with a [`Tracer`]. Some providers return a
/// shared, globally-owned tracer with a no-op closer; others materialize a
/// per-request tracer that must flush on drop.
pub trait Closer: fmt::Debug + Send {
    /// Release/flush any resources held on behalf of the paired tracer.
    fn close(self: Box<Self>);
}

/// A no-op closer for providers that return a shared tracer.
#[derive(Debug, Default)]
pub struct NoopCloser;

impl Closer for NoopCloser {
    fn close(self: Box<Self>) {}
}

/// Yields a `(Tracer, Closer)` pair per request. Implementations: logging,
/// mock, and external (thin HTTP-shipping bindings to a collector).
pub trait TracerProvider: fmt::Debug + Send + Sync {
    /// Returns a tracer bound to `service_name` together with its closer.
    /// `service_name` is typically the source name (`github`, `jenkins`, ...)
    /// so that spans from distinct sources can be routed to distinct
    /// services in the backend.
    fn tracer(&self, service_name: &str) -> (Box<dyn Tracer>, Box<dyn Closer>);
}
