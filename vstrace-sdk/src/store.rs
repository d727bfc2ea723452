//! Bounded, mutex-guarded span store.
//!
//! One entry per logical activity, keyed by `span_id`. Unlike the
//! circular-buffer design this engine descends from, the store never
//! evicts: once full it refuses new writes with
//! [`PipelineError::CapacityExceeded`] so that occupancy remains an honest
//! signal of unclosed spans rather than silently dropping the oldest ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use vstrace_api::{Span, SpanContext, SpanState};

use crate::error::{PipelineError, Result};

/// A span held open by the store, plus the bookkeeping the pipeline needs
/// to classify the next delivery for the same `span_id`.
pub struct StoreEntry {
    pub span: Box<dyn Span>,
    pub context: Arc<dyn SpanContext>,
    pub state: SpanState,
    pub opened_at: Instant,
}

impl StoreEntry {
    pub fn new(span: Box<dyn Span>, state: SpanState) -> Self {
        let context = span.context();
        StoreEntry {
            span,
            context,
            state,
            opened_at: Instant::now(),
        }
    }
}

struct Inner {
    entries: HashMap<String, StoreEntry>,
    capacity: usize,
}

/// A bounded table of open spans, shared across all concurrent requests for
/// a given source.
pub struct SpanStore {
    inner: Mutex<Inner>,
}

impl SpanStore {
    pub fn new(capacity: usize) -> Self {
        SpanStore {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().expect("span store mutex poisoned").capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("span store mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports whether a Start for `span_id` would currently be admitted:
    /// true if the key already exists (a replacement, not a growth) or the
    /// store has slack. The pipeline calls this before starting a span on
    /// the tracer backend, so a full store rejects the event without
    /// opening (and immediately abandoning) a backend span. The final
    /// [`SpanStore::insert`] remains the authoritative capacity check; a
    /// concurrent burst can still race between the two, in which case the
    /// already-opened span is dropped unfinished rather than double-counted.
    pub fn has_capacity_for(&self, span_id: &str) -> bool {
        let inner = self.inner.lock().expect("span store mutex poisoned");
        inner.entries.contains_key(span_id) || inner.entries.len() < inner.capacity
    }

    /// Inserts a new entry, replacing any existing one for `span_id`.
    /// Refuses the write once the store is at capacity, unless it is
    /// replacing an existing key (a Transition's Start leg reuses the id
    /// the End leg just vacated).
    pub fn insert(&self, span_id: String, entry: StoreEntry) -> Result<()> {
        let mut inner = self.inner.lock().expect("span store mutex poisoned");
        let capacity = inner.capacity;
        if !inner.entries.contains_key(&span_id) && inner.entries.len() >= capacity {
            return Err(PipelineError::CapacityExceeded(capacity));
        }
        inner.entries.insert(span_id, entry);
        Ok(())
    }

    /// Removes and returns the entry for `span_id`, if any. The caller is
    /// responsible for finishing the returned span outside any lock.
    pub fn take(&self, span_id: &str) -> Option<StoreEntry> {
        self.inner
            .lock()
            .expect("span store mutex poisoned")
            .entries
            .remove(span_id)
    }

    /// The previously observed state and context for `span_id`, without
    /// removing it. Used to classify a delivery before deciding whether to
    /// mutate the store.
    pub fn peek(&self, span_id: &str) -> Option<(SpanState, Arc<dyn SpanContext>)> {
        self.inner
            .lock()
            .expect("span store mutex poisoned")
            .entries
            .get(span_id)
            .map(|e| (e.state, Arc::clone(&e.context)))
    }

    /// Looks up the context of `span_id` for use as a child's parent.
    pub fn context_of(&self, span_id: &str) -> Option<Arc<dyn SpanContext>> {
        self.inner
            .lock()
            .expect("span store mutex poisoned")
            .entries
            .get(span_id)
            .map(|e| Arc::clone(&e.context))
    }

    /// Removes every entry, discarding their spans without finishing them.
    /// Test/mock-mode only: a production tracer backend would leak spans
    /// it never saw finished.
    pub fn clear(&self) {
        self.inner.lock().expect("span store mutex poisoned").entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug)]
    struct FakeContext;
    impl SpanContext for FakeContext {
        fn trace_id_hex(&self) -> String {
            "deadbeef".to_string()
        }
    }

    #[derive(Debug)]
    struct FakeSpan;
    impl Span for FakeSpan {
        fn set_tag(&self, _tag: vstrace_api::KeyValue) {}
        fn context(&self) -> Arc<dyn SpanContext> {
            Arc::new(FakeContext)
        }
        fn finish(self: Box<Self>, _duration_override: Option<std::time::Duration>) {}
    }

    fn entry(state: SpanState) -> StoreEntry {
        StoreEntry::new(Box::new(FakeSpan), state)
    }

    #[rstest]
    fn insert_refuses_past_capacity() {
        let store = SpanStore::new(1);
        store.insert("a".into(), entry(SpanState::Start)).unwrap();
        let err = store.insert("b".into(), entry(SpanState::Start)).unwrap_err();
        assert!(matches!(err, PipelineError::CapacityExceeded(1)));
    }

    #[rstest]
    fn insert_allows_replacing_existing_key_at_capacity() {
        let store = SpanStore::new(1);
        store.insert("a".into(), entry(SpanState::Start)).unwrap();
        store.insert("a".into(), entry(SpanState::Transition)).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[rstest]
    fn take_is_idempotent() {
        let store = SpanStore::new(4);
        store.insert("a".into(), entry(SpanState::Start)).unwrap();
        assert!(store.take("a").is_some());
        assert!(store.take("a").is_none());
        assert_eq!(store.len(), 0);
    }

    #[rstest]
    fn balanced_start_end_returns_to_zero_occupancy() {
        let store = SpanStore::new(4);
        store.insert("a".into(), entry(SpanState::Start)).unwrap();
        store.insert("b".into(), entry(SpanState::Start)).unwrap();
        store.take("a").unwrap().span.finish(None);
        store.take("b").unwrap().span.finish(None);
        assert!(store.is_empty());
    }

    #[rstest]
    fn peek_does_not_remove() {
        let store = SpanStore::new(4);
        store.insert("a".into(), entry(SpanState::Start)).unwrap();
        let (state, _ctx) = store.peek("a").unwrap();
        assert_eq!(state, SpanState::Start);
        assert_eq!(store.len(), 1);
    }
}
