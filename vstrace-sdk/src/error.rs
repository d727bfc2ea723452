//! Pipeline error taxonomy.

use thiserror::Error;
use vstrace_api::IdDerivationError;

/// Everything that can go wrong turning a webhook delivery into a span
/// mutation. Each variant maps to a specific HTTP status in `vstrace-server`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The payload's signature did not verify against the configured secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// The request body could not be read (truncated, transport error).
    #[error("unreadable request body: {0}")]
    UnreadableBody(String),

    /// The body was read but the source adapter could not decode it.
    #[error("could not decode payload: {0}")]
    DecodeError(String),

    /// The payload decoded but named an activity kind this adapter does
    /// not handle (e.g. a GitHub `ping` delivery).
    #[error("unsupported event kind: {0}")]
    UnsupportedEventKind(String),

    /// The event lacked a field its classification required.
    #[error(transparent)]
    IdDerivation(#[from] IdDerivationError),

    /// The span store is at capacity and refused the write.
    #[error("span store at capacity ({0})")]
    CapacityExceeded(usize),

    /// An End or Transition referenced a span_id with no open span.
    #[error("no open span for id {0}")]
    SpanMissing(String),

    /// The configured tracer backend could not be reached or is misconfigured.
    #[error("tracer backend unavailable: {0}")]
    TracerUnavailable(String),

    /// Configuration was invalid at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
