//! The neutral `Event` capability contract every source adapter implements.

use crate::KeyValue;
use std::time::Duration;
use thiserror::Error;

/// Classification of a single webhook delivery relative to the span
/// identified by [`Event::span_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanState {
    /// Opens a new span.
    Start,
    /// Closes the live span.
    End,
    /// Closes the live span then immediately opens a new one for the same
    /// logical activity (e.g. a pipeline moving `pending` -> `running`).
    Transition,
    /// A delivery that doesn't change span lifecycle (e.g. a PR comment).
    Intermediary,
    /// The adapter could not classify the event at all.
    Unknown,
}

/// Authoritative start/end/duration reported by the source itself. When a
/// source supplies these, the correlation pipeline prefers them over
/// wall-clock measurement for the latency histogram.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EventTimings {
    pub duration: Option<Duration>,
}

impl EventTimings {
    pub const NONE: EventTimings = EventTimings { duration: None };
}

/// Failure to derive a required field (span id, parent id, state) from a
/// decoded payload. Distinct from decode failures: the payload parsed fine,
/// but lacks the discriminating fields this activity kind requires.
#[derive(Debug, Error)]
#[error("event missing required field: {0}")]
pub struct IdDerivationError(pub String);

/// The neutral capability set a decoded webhook payload exposes to the
/// correlation pipeline. One adapter implementation per activity kind
/// (issue, pull request, build, sprint, ...); the pipeline never knows
/// which vendor or kind produced the event it is holding.
pub trait Event {
    /// Stable, deterministic identifier for this logical activity. The
    /// start and end events of the same activity must produce the same id.
    fn span_id(&self) -> Result<String, IdDerivationError>;

    /// Human-readable span name (`issue`, `pull_request`, `build`, ...).
    fn operation_name(&self) -> &str;

    /// Another activity's span id, if this payload carries one.
    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError>;

    /// Classify this delivery. `prev` is the previously observed state for
    /// this span_id, if any; some adapters need it to disambiguate (a
    /// second `opened` should classify as `Intermediary`, not `Start`).
    fn state(&self, prev: Option<SpanState>) -> SpanState;

    /// Whether the terminal state represents a failure, for the `error` tag
    /// applied on close.
    fn is_error(&self) -> bool;

    /// Tags to attach to the span when it is opened (or re-tagged on a
    /// Transition's Start leg).
    fn tags(&self) -> Vec<KeyValue>;

    /// Authoritative timings, if the source reports them.
    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}
