//! Request metrics in the Prometheus text format.

use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use warp::http::StatusCode;

const LABELS: [&str; 3] = ["code", "method", "path"];

/// Request counter and latency histogram, labelled by status code, method
/// and route template.
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    durations: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_request_total", "Total number of HTTP requests"),
            &LABELS,
        )
        .context("Failed to create request counter")?;
        let durations = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "Duration of HTTP requests"),
            &LABELS,
        )
        .context("Failed to create request histogram")?;

        registry
            .register(Box::new(requests.clone()))
            .context("Failed to register request counter")?;
        registry
            .register(Box::new(durations.clone()))
            .context("Failed to register request histogram")?;

        Ok(Self {
            registry,
            requests,
            durations,
        })
    }

    /// Record one finished request.
    pub fn observe(&self, method: &str, path: &str, status: StatusCode, elapsed: Duration) {
        let labels = [status.as_str(), method, path];
        self.requests.with_label_values(&labels).inc();
        self.durations
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }

    /// Requests seen so far for one label set.
    pub fn request_count(&self, status: StatusCode, method: &str, path: &str) -> u64 {
        self.requests
            .with_label_values(&[status.as_str(), method, path])
            .get()
    }

    /// Content type of [`Metrics::render`]'s output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics are not valid UTF-8")
    }
}
