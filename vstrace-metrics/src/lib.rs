//! Prometheus-format exposition of the correlation engine's operational
//! signals: span store occupancy, per-source event counters, and a
//! minute-to-month latency histogram.
//!
//! [`PrometheusObserver`] implements [`vstrace_api::Observer`] so
//! `vstrace-sdk` and `vstrace-sources` never depend on `prometheus`
//! directly; `vstrace-server` owns one instance and serves its
//! [`PrometheusObserver::render`] output at `/metrics`.

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use vstrace_api::{EventOutcome, Observer};

/// Bucket boundaries (in seconds) spanning a minute to a month, matching
/// the real distribution of activity durations this engine tracks: a CI
/// job finishes in minutes, an issue or sprint can run for weeks.
const LATENCY_BUCKETS_SECONDS: &[f64] = &[
    60.0,
    300.0,
    900.0,
    3_600.0,
    4.0 * 3_600.0,
    24.0 * 3_600.0,
    7.0 * 24.0 * 3_600.0,
    30.0 * 24.0 * 3_600.0,
];

fn outcome_label(outcome: EventOutcome) -> &'static str {
    match outcome {
        EventOutcome::Started => "start",
        EventOutcome::Ended => "end",
        EventOutcome::Intermediary => "intermediary",
        EventOutcome::Rejected => "rejected",
    }
}

fn error_label(error: bool) -> &'static str {
    if error {
        "true"
    } else {
        "false"
    }
}

#[derive(Debug)]
pub struct PrometheusObserver {
    registry: Registry,
    events_total: CounterVec,
    span_duration_seconds: HistogramVec,
    store_occupancy: GaugeVec,
    store_capacity: GaugeVec,
}

impl PrometheusObserver {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_total = CounterVec::new(
            Opts::new("vstrace_events_total", "Webhook deliveries processed, by source, kind, error, and outcome"),
            &["source", "kind", "error", "outcome"],
        )?;
        let span_duration_seconds = HistogramVec::new(
            HistogramOpts::new("vstrace_span_duration_seconds", "Closed span durations, by source")
                .buckets(LATENCY_BUCKETS_SECONDS.to_vec()),
            &["source"],
        )?;
        let store_occupancy = GaugeVec::new(
            Opts::new("vstrace_store_occupancy", "Current span store occupancy, by buffer"),
            &["buffer"],
        )?;
        let store_capacity = GaugeVec::new(
            Opts::new("vstrace_store_capacity", "Configured span store capacity, by buffer"),
            &["buffer"],
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(span_duration_seconds.clone()))?;
        registry.register(Box::new(store_occupancy.clone()))?;
        registry.register(Box::new(store_capacity.clone()))?;

        Ok(PrometheusObserver { registry, events_total, span_duration_seconds, store_occupancy, store_capacity })
    }

    /// Renders the current state of all registered metrics in the
    /// Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = String::new();
        encoder.encode_utf8(&families, &mut buf)?;
        Ok(buf)
    }
}

impl Observer for PrometheusObserver {
    fn record_event(&self, source: &str, kind: &str, error: bool, outcome: EventOutcome) {
        self.events_total.with_label_values(&[source, kind, error_label(error), outcome_label(outcome)]).inc();
    }

    fn record_span_duration(&self, source: &str, duration: std::time::Duration) {
        self.span_duration_seconds.with_label_values(&[source]).observe(duration.as_secs_f64());
    }

    fn record_occupancy(&self, buffer: &str, len: usize, capacity: usize) {
        self.store_occupancy.with_label_values(&[buffer]).set(len as f64);
        self.store_capacity.with_label_values(&[buffer]).set(capacity as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_series() {
        let observer = PrometheusObserver::new().unwrap();
        observer.record_event("github", "issue", false, EventOutcome::Started);
        observer.record_span_duration("github", std::time::Duration::from_secs(120));
        observer.record_occupancy("spans", 3, 1000);

        let rendered = observer.render().unwrap();
        assert!(rendered.contains("vstrace_events_total"));
        assert!(rendered.contains("vstrace_span_duration_seconds"));
        assert!(rendered.contains("vstrace_store_occupancy"));
    }
}
