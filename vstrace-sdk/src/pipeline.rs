//! The classify-and-dispatch half of the correlation pipeline.
//!
//! Source adapters own validation and decoding (`vstrace-sources`); this
//! module owns everything from "we have an `Event`" onward: computing the
//! span id, classifying against the store's previous state, and mutating
//! the store through exactly one of Start/End/Transition/no-op.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use vstrace_api::{Event, EventOutcome, KeyValue, Observer, SpanState, StartSpanOptions, Tracer};

use crate::error::{PipelineError, Result};
use crate::store::{SpanStore, StoreEntry};

/// Runs one decoded event through classify-and-dispatch against `store`,
/// using `tracer` to open/finish spans and `observer` to report outcomes.
/// `source` labels metrics and logs (`github`, `jenkins`, ...).
pub fn dispatch(
    source: &str,
    event: &dyn Event,
    store: &SpanStore,
    tracer: &dyn Tracer,
    observer: &dyn Observer,
) -> Result<()> {
    let span_id = event.span_id()?;
    let prev_state = store.peek(&span_id).map(|(state, _)| state);
    let state = event.state(prev_state);

    match state {
        SpanState::Start => start(source, &span_id, event, store, tracer, observer),
        SpanState::End => end(source, &span_id, event, store, observer),
        SpanState::Transition => {
            if let Err(e) = end(source, &span_id, event, store, observer) {
                warn!(source, %span_id, error = %e, "transition's end leg failed, continuing to start leg");
            }
            start(source, &span_id, event, store, tracer, observer)
        }
        SpanState::Intermediary | SpanState::Unknown => {
            debug!(source, kind = event.operation_name(), %span_id, ?state, "no-op delivery");
            observer.record_event(source, event.operation_name(), event.is_error(), EventOutcome::Intermediary);
            Ok(())
        }
    }
}

fn start(
    source: &str,
    span_id: &str,
    event: &dyn Event,
    store: &SpanStore,
    tracer: &dyn Tracer,
    observer: &dyn Observer,
) -> Result<()> {
    if !store.has_capacity_for(span_id) {
        observer.record_event(source, event.operation_name(), event.is_error(), EventOutcome::Rejected);
        return Err(PipelineError::CapacityExceeded(store.capacity()));
    }

    let parent = event
        .parent_span_id()?
        .and_then(|parent_id| store.context_of(&parent_id));

    let span = tracer.start_span(event.operation_name(), StartSpanOptions { parent });
    for tag in event.tags() {
        span.set_tag(tag);
    }

    let entry = StoreEntry::new(span, SpanState::Start);
    match store.insert(span_id.to_string(), entry) {
        Ok(()) => {
            observer.record_event(source, event.operation_name(), event.is_error(), EventOutcome::Started);
            Ok(())
        }
        Err(e @ PipelineError::CapacityExceeded(_)) => {
            observer.record_event(source, event.operation_name(), event.is_error(), EventOutcome::Rejected);
            Err(e)
        }
        Err(e) => Err(e),
    }
}

fn end(source: &str, span_id: &str, event: &dyn Event, store: &SpanStore, observer: &dyn Observer) -> Result<()> {
    let Some(entry) = store.take(span_id) else {
        warn!(source, kind = event.operation_name(), %span_id, "end event for unknown span");
        return Err(PipelineError::SpanMissing(span_id.to_string()));
    };

    entry.span.set_tag(KeyValue::new("error", event.is_error()));

    let duration = event
        .timings()
        .duration
        .unwrap_or_else(|| entry.opened_at.elapsed());
    record_latency(source, duration, observer, entry.opened_at);

    entry.span.finish(Some(duration));
    observer.record_event(source, event.operation_name(), event.is_error(), EventOutcome::Ended);
    Ok(())
}

fn record_latency(source: &str, duration: Duration, observer: &dyn Observer, _opened_at: Instant) {
    observer.record_span_duration(source, duration);
}

/// Convenience wrapper bundling the pieces a router handler needs for one
/// source: its store, tracer, and observer, so handlers just call
/// `PipelineContext::handle`.
pub struct PipelineContext {
    pub source: &'static str,
    pub store: Arc<SpanStore>,
    pub tracer: Arc<dyn Tracer>,
    pub observer: Arc<dyn Observer>,
}

impl PipelineContext {
    pub fn handle(&self, event: &dyn Event) -> Result<()> {
        dispatch(self.source, event, &self.store, self.tracer.as_ref(), self.observer.as_ref())
    }

    /// Dispatches every event a single webhook delivery produced, in
    /// order. Most sources decode to exactly one event; a few (GitLab's
    /// pipeline hook, synthesizing a logical span alongside the physical
    /// one) decode to more. Every event is attempted regardless of
    /// earlier failures, so one leg's rejection doesn't strand the rest
    /// of the delivery; the first error encountered is returned.
    pub fn handle_all(&self, events: &[Box<dyn Event>]) -> Result<()> {
        let mut first_err = None;
        for event in events {
            if let Err(e) = self.handle(event.as_ref()) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Mutex;
    use vstrace_api::{IdDerivationError, NoopObserver, SpanContext, Span};

    #[derive(Debug)]
    struct FakeContext;
    impl SpanContext for FakeContext {
        fn trace_id_hex(&self) -> String {
            "cafef00d".to_string()
        }
    }

    #[derive(Debug)]
    struct FakeSpan {
        tags: Mutex<Vec<KeyValue>>,
    }
    impl Span for FakeSpan {
        fn set_tag(&self, tag: KeyValue) {
            self.tags.lock().unwrap().push(tag);
        }
        fn context(&self) -> Arc<dyn SpanContext> {
            Arc::new(FakeContext)
        }
        fn finish(self: Box<Self>, _duration_override: Option<Duration>) {}
    }

    #[derive(Debug, Default)]
    struct FakeTracer;
    impl Tracer for FakeTracer {
        fn start_span(&self, _operation_name: &str, _opts: StartSpanOptions) -> Box<dyn Span> {
            Box::new(FakeSpan { tags: Mutex::new(Vec::new()) })
        }
    }

    struct FakeEvent {
        id: &'static str,
        parent: Option<&'static str>,
        state: RefCell<SpanState>,
        error: bool,
    }

    impl Event for FakeEvent {
        fn span_id(&self) -> std::result::Result<String, IdDerivationError> {
            Ok(self.id.to_string())
        }
        fn operation_name(&self) -> &str {
            "issue"
        }
        fn parent_span_id(&self) -> std::result::Result<Option<String>, IdDerivationError> {
            Ok(self.parent.map(|p| p.to_string()))
        }
        fn state(&self, _prev: Option<SpanState>) -> SpanState {
            *self.state.borrow()
        }
        fn is_error(&self) -> bool {
            self.error
        }
        fn tags(&self) -> Vec<KeyValue> {
            Vec::new()
        }
    }

    #[test]
    fn start_then_end_balances_occupancy() {
        let store = SpanStore::new(4);
        let tracer = FakeTracer;
        let observer = vstrace_api::NoopObserver;

        let start_event = FakeEvent { id: "a", parent: None, state: RefCell::new(SpanState::Start), error: false };
        dispatch("github", &start_event, &store, &tracer, &observer).unwrap();
        assert_eq!(store.len(), 1);

        let end_event = FakeEvent { id: "a", parent: None, state: RefCell::new(SpanState::End), error: false };
        dispatch("github", &end_event, &store, &tracer, &observer).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn end_without_start_reports_span_missing() {
        let store = SpanStore::new(4);
        let tracer = FakeTracer;
        let observer = NoopObserver;
        let end_event = FakeEvent { id: "ghost", parent: None, state: RefCell::new(SpanState::End), error: false };
        let err = dispatch("github", &end_event, &store, &tracer, &observer).unwrap_err();
        assert!(matches!(err, PipelineError::SpanMissing(id) if id == "ghost"));
    }

    #[test]
    fn transition_closes_then_reopens_same_id() {
        let store = SpanStore::new(4);
        let tracer = FakeTracer;
        let observer = NoopObserver;

        let start_event = FakeEvent { id: "p", parent: None, state: RefCell::new(SpanState::Start), error: false };
        dispatch("jenkins", &start_event, &store, &tracer, &observer).unwrap();

        let transition_event = FakeEvent { id: "p", parent: None, state: RefCell::new(SpanState::Transition), error: false };
        dispatch("jenkins", &transition_event, &store, &tracer, &observer).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn start_refused_without_touching_backend_when_full() {
        let store = SpanStore::new(1);
        let tracer = FakeTracer;
        let observer = NoopObserver;
        let first = FakeEvent { id: "a", parent: None, state: RefCell::new(SpanState::Start), error: false };
        dispatch("github", &first, &store, &tracer, &observer).unwrap();

        let second = FakeEvent { id: "b", parent: None, state: RefCell::new(SpanState::Start), error: false };
        let err = dispatch("github", &second, &store, &tracer, &observer).unwrap_err();
        assert!(matches!(err, PipelineError::CapacityExceeded(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn intermediary_is_a_no_op() {
        let store = SpanStore::new(4);
        let tracer = FakeTracer;
        let observer = NoopObserver;
        let event = FakeEvent { id: "comment", parent: None, state: RefCell::new(SpanState::Intermediary), error: false };
        dispatch("github", &event, &store, &tracer, &observer).unwrap();
        assert_eq!(store.len(), 0);
    }
}
