//! Wires configuration into a running server: tracer provider selection,
//! the shared span store, per-source pipeline contexts, and the metrics
//! and mock-tracer introspection surfaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use vstrace_api::{Observer, TracerProvider};
use vstrace_metrics::PrometheusObserver;
use vstrace_sdk::{sampler, Config, PipelineContext, SpanStore, TracerBackend};
use vstrace_tracers::{ExternalTracerProvider, ExternalVendor, LoggingTracerProvider, MockTracerProvider};

pub const SOURCES: &[&str] = &["github", "gitlab", "jenkins", "jira", "customhttp"];

pub struct App {
    pub config: Config,
    pub store: Arc<SpanStore>,
    pub metrics: Arc<PrometheusObserver>,
    pub pipelines: HashMap<&'static str, PipelineContext>,
    pub mock_tracer: Option<MockTracerProvider>,
    // Shared across every connection's `Arc<App>` clone, so shutdown takes
    // `&self` and reaches into these through interior mutability rather than
    // requiring the caller to reassemble a uniquely-owned `App`.
    closers: Mutex<Vec<Box<dyn vstrace_api::Closer>>>,
    sampler: Mutex<Option<sampler::SamplerHandle>>,
}

fn build_provider(config: &Config) -> (Box<dyn TracerProvider>, Option<MockTracerProvider>) {
    match config.tracer_backend {
        TracerBackend::Logging => (Box::new(LoggingTracerProvider), None),
        TracerBackend::Mock => {
            let provider = MockTracerProvider::new();
            (Box::new(provider.clone()), Some(provider))
        }
        TracerBackend::Jaeger | TracerBackend::Lightstep | TracerBackend::Datadog => {
            let vendor = match config.tracer_backend {
                TracerBackend::Jaeger => ExternalVendor::Jaeger,
                TracerBackend::Lightstep => ExternalVendor::Lightstep,
                _ => ExternalVendor::Datadog,
            };
            let collector_url = config.tracer_collector_url.clone().unwrap_or_default();
            (
                Box::new(ExternalTracerProvider::new(vendor, collector_url, config.tracer_access_token.clone())),
                None,
            )
        }
    }
}

impl App {
    pub fn build(config: Config) -> Result<Self, prometheus::Error> {
        let (provider, mock_tracer) = build_provider(&config);
        let store = Arc::new(SpanStore::new(config.store_capacity));
        let metrics = Arc::new(PrometheusObserver::new()?);
        let observer: Arc<dyn Observer> = Arc::clone(&metrics) as Arc<dyn Observer>;

        let mut pipelines = HashMap::new();
        let mut closers = Vec::new();
        for source in SOURCES {
            tracing::info!(source, "initializing source");
            let (tracer, closer) = provider.tracer(source);
            closers.push(closer);
            pipelines.insert(
                *source,
                PipelineContext {
                    source,
                    store: Arc::clone(&store),
                    tracer: Arc::from(tracer),
                    observer: Arc::clone(&observer),
                },
            );
        }

        let sampler = sampler::spawn("spans", Arc::clone(&store), Arc::clone(&observer), config.store_sample_interval);

        Ok(App {
            config,
            store,
            metrics,
            pipelines,
            mock_tracer,
            closers: Mutex::new(closers),
            sampler: Mutex::new(Some(sampler)),
        })
    }

    /// Stops the sampler and flushes every tracer's closer. Idempotent: a
    /// second call is a no-op, since both are taken out on the first.
    pub async fn shutdown(&self) {
        let sampler = self.sampler.lock().unwrap().take();
        if let Some(sampler) = sampler {
            sampler.stop().await;
        }
        let closers = std::mem::take(&mut *self.closers.lock().unwrap());
        for closer in closers {
            closer.close();
        }
    }
}
