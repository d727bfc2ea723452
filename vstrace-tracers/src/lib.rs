//! Tracer provider implementations. `vstrace-server` selects one at startup
//! based on `VS_TRACER_BACKEND`.

pub mod external;
pub mod logging;
pub mod mock;

pub use external::{ExternalCloser, ExternalTracer, ExternalTracerProvider, ExternalVendor};
pub use logging::{LoggingTracer, LoggingTracerProvider};
pub use mock::{FinishedSpan, MockTracer, MockTracerProvider};
