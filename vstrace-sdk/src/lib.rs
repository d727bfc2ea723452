//! Span store and correlation pipeline for the value-stream trace
//! correlation engine.
//!
//! Source adapters (`vstrace-sources`) turn a webhook delivery into an
//! [`vstrace_api::Event`]; this crate owns everything downstream of that:
//! the bounded [`store::SpanStore`], the classify-and-dispatch logic in
//! [`pipeline`], environment-driven [`config::Config`], and the background
//! occupancy [`sampler`].

pub mod config;
pub mod error;
pub mod pipeline;
pub mod sampler;
pub mod store;

pub use config::{Config, ConfigError, LogLevel, TracerBackend};
pub use error::{PipelineError, Result};
pub use pipeline::{dispatch, PipelineContext};
pub use sampler::SamplerHandle;
pub use store::{SpanStore, StoreEntry};
