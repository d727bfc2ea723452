//! Core contracts for the value-stream trace correlation engine.
//!
//! This crate defines the seams the rest of the workspace builds against:
//! [`trace::Tracer`] / [`trace::TracerProvider`] / [`trace::Span`] for the
//! pluggable tracing backend, and [`event::Event`] for the neutral
//! capability set every source adapter decodes a webhook payload into.
//! Nothing here knows about HTTP, a specific vendor, or a concrete span
//! store — those live in `vstrace-sdk`, `vstrace-sources`, and
//! `vstrace-tracers`.

pub mod event;
pub mod observe;
pub mod trace;
mod value;

pub use event::{Event, EventTimings, IdDerivationError, SpanState};
pub use observe::{EventOutcome, NoopObserver, Observer};
pub use trace::{Closer, NoopCloser, Span, SpanContext, StartSpanOptions, Tracer, TracerProvider};
pub use value::{KeyValue, Value};
