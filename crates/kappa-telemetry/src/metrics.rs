//! Prometheus-backed metrics registry.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Label values are bounded: routes are matched templates, reasons and resources are
//!   static identifiers.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    auth_failures_total: IntCounterVec,
    access_denied_total: IntCounterVec,
    rate_limit_throttled_total: IntCounter,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let auth_failures_total = counter_vec(
            "auth_failures_total",
            "API key authentication failures by reason",
            &["reason"],
        )?;
        let access_denied_total = counter_vec(
            "access_denied_total",
            "Requests rejected by DoseGuard ownership checks",
            &["resource"],
        )?;
        let rate_limit_throttled_total = IntCounter::with_opts(Opts::new(
            "api_rate_limit_throttled_total",
            "Requests rejected due to API rate limiting",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "api_rate_limit_throttled_total",
            source,
        })?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "auth_failures_total", &auth_failures_total)?;
        register(&registry, "access_denied_total", &access_denied_total)?;
        register(
            &registry,
            "api_rate_limit_throttled_total",
            &rate_limit_throttled_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                auth_failures_total,
                access_denied_total,
                rate_limit_throttled_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the authentication failure counter.
    pub fn inc_auth_failure(&self, reason: &str) {
        self.inner
            .auth_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Increment the ownership denial counter for a resource kind.
    pub fn inc_access_denied(&self, resource: &str) {
        self.inner
            .access_denied_total
            .with_label_values(&[resource])
            .inc();
    }

    /// Increment the API rate limiter throttle counter.
    pub fn inc_rate_limit_throttled(&self) {
        self.inner.rate_limit_throttled_total.inc();
    }

    /// Requests rejected by the rate limiter so far.
    #[must_use]
    pub fn rate_limit_throttled(&self) -> u64 {
        self.inner.rate_limit_throttled_total.get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_labels() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/api/health", 200);
        metrics.inc_auth_failure("invalid_key");
        metrics.inc_access_denied("patient");
        metrics.inc_rate_limit_throttled();
        assert_eq!(metrics.rate_limit_throttled(), 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total{code=\"200\",route=\"/api/health\"} 1"));
        assert!(rendered.contains("auth_failures_total{reason=\"invalid_key\"} 1"));
        assert!(rendered.contains("access_denied_total{resource=\"patient\"} 1"));
        assert!(rendered.contains("api_rate_limit_throttled_total 1"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_rate_limit_throttled();
        assert_eq!(second.rate_limit_throttled(), 0);
        Ok(())
    }
}
