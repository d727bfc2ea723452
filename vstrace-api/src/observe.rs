//! Observability sink contract.
//!
//! The pipeline and span store report occupancy, event counts, and
//! latencies through this trait rather than calling a metrics library
//! directly, so `vstrace-sdk` stays ignorant of Prometheus (or whatever
//! `vstrace-metrics` ships next).

use std::fmt;
use std::time::Duration;

/// Outcome of a single processed event, for counter labeling. A
/// [`vstrace_api::SpanState::Transition`] records as an `Ended` leg
/// immediately followed by a `Started` leg rather than a distinct outcome:
/// each leg mutates the store exactly like an independent end/start would,
/// so each is counted that way too.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Started,
    Ended,
    Intermediary,
    Rejected,
}

/// Receives the correlation engine's operational signals. Implementations
/// must be cheap to call on the request path and must not block.
pub trait Observer: fmt::Debug + Send + Sync {
    /// A webhook delivery was processed for `source` (`github`, `jenkins`,
    /// ...) with the given `outcome`. `kind` is the event's operation name
    /// (`issue`, `build`, ...) and `error` reports whether the event's
    /// terminal state represents a failure, so counters can be sliced by
    /// source, kind, and error independent of the lifecycle outcome.
    fn record_event(&self, source: &str, kind: &str, error: bool, outcome: EventOutcome);

    /// Wall-clock (or source-reported) span duration, recorded when a span
    /// closes.
    fn record_span_duration(&self, source: &str, duration: Duration);

    /// Current occupancy of a named bounded buffer (e.g. the span store),
    /// alongside its configured capacity.
    fn record_occupancy(&self, buffer: &str, len: usize, capacity: usize);
}

/// An [`Observer`] that discards everything. Used where a caller wants the
/// pipeline's signature without wiring `vstrace-metrics`.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_event(&self, _source: &str, _kind: &str, _error: bool, _outcome: EventOutcome) {}
    fn record_span_duration(&self, _source: &str, _duration: Duration) {}
    fn record_occupancy(&self, _buffer: &str, _len: usize, _capacity: usize) {}
}
