//! # Prometheus Metrics
//!
//! Exposes escrow activity counters and operation latency. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `pointlock` prefix so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct EscrowMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Escrows accepted by `open`.
    pub contracts_opened_total: IntCounter,
    /// Escrows claimed with the committed scalar.
    pub contracts_withdrawn_total: IntCounter,
    /// Escrows returned to their sender.
    pub contracts_refunded_total: IntCounter,
    /// Refused operations, by operation and error code.
    pub operations_rejected_total: IntCounterVec,
    /// Engine call latency in seconds, by operation.
    pub operation_latency_seconds: HistogramVec,
}

impl EscrowMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("pointlock".into()), None)?;

        let contracts_opened_total =
            IntCounter::new("contracts_opened_total", "Total number of escrows opened")?;
        registry.register(Box::new(contracts_opened_total.clone()))?;

        let contracts_withdrawn_total = IntCounter::new(
            "contracts_withdrawn_total",
            "Total number of escrows withdrawn by revealing the committed scalar",
        )?;
        registry.register(Box::new(contracts_withdrawn_total.clone()))?;

        let contracts_refunded_total = IntCounter::new(
            "contracts_refunded_total",
            "Total number of escrows refunded to their sender",
        )?;
        registry.register(Box::new(contracts_refunded_total.clone()))?;

        let operations_rejected_total = IntCounterVec::new(
            Opts::new(
                "operations_rejected_total",
                "Total number of escrow operations refused, by operation and error code",
            ),
            &["operation", "code"],
        )?;
        registry.register(Box::new(operations_rejected_total.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Escrow engine operation latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            contracts_opened_total,
            contracts_withdrawn_total,
            contracts_refunded_total,
            operations_rejected_total,
            operation_latency_seconds,
        })
    }

    /// Record how long `operation` took, measured from `started`.
    pub fn observe_latency(&self, operation: &str, started: Instant) {
        self.operation_latency_seconds
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Count a refused operation.
    pub fn record_rejection(&self, operation: &str, code: &str) {
        self.operations_rejected_total
            .with_label_values(&[operation, code])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<EscrowMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
