//! # Prometheus Metrics
//!
//! Exposes operational metrics for the wallet server. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint on the configured metrics
//! port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the server.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct WalletMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of ledger transactions recorded (on- and off-chain).
    pub transactions_recorded_total: IntCounter,
    /// Total number of custodial cards issued.
    pub cards_issued_total: IntCounter,
    /// Total number of on-chain sends confirmed by the chain.
    pub chain_sends_total: IntCounter,
    /// Total number of on-chain sends that failed before confirmation.
    pub chain_send_failures_total: IntCounter,
    /// Total number of idempotent replays served from a stored key.
    pub idempotent_replays_total: IntCounter,
    /// Total number of reconciliation gaps: chain confirmed, mirror missed.
    pub reconciliation_gaps_total: IntCounter,
    /// Histogram of on-chain send latency in seconds, submission to
    /// confirmation.
    pub chain_send_latency_seconds: Histogram,
}

impl WalletMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("arca".into()), None)
            .expect("failed to create prometheus registry");

        let transactions_recorded_total = IntCounter::new(
            "transactions_recorded_total",
            "Total number of ledger transactions recorded",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_recorded_total.clone()))
            .expect("metric registration");

        let cards_issued_total =
            IntCounter::new("cards_issued_total", "Total number of custodial cards issued")
                .expect("metric creation");
        registry
            .register(Box::new(cards_issued_total.clone()))
            .expect("metric registration");

        let chain_sends_total = IntCounter::new(
            "chain_sends_total",
            "Total number of on-chain sends confirmed by the chain",
        )
        .expect("metric creation");
        registry
            .register(Box::new(chain_sends_total.clone()))
            .expect("metric registration");

        let chain_send_failures_total = IntCounter::new(
            "chain_send_failures_total",
            "Total number of on-chain sends that failed before confirmation",
        )
        .expect("metric creation");
        registry
            .register(Box::new(chain_send_failures_total.clone()))
            .expect("metric registration");

        let idempotent_replays_total = IntCounter::new(
            "idempotent_replays_total",
            "Total number of sends answered from a stored idempotency key",
        )
        .expect("metric creation");
        registry
            .register(Box::new(idempotent_replays_total.clone()))
            .expect("metric registration");

        let reconciliation_gaps_total = IntCounter::new(
            "reconciliation_gaps_total",
            "Total number of confirmed chain transfers the ledger mirror failed to record",
        )
        .expect("metric creation");
        registry
            .register(Box::new(reconciliation_gaps_total.clone()))
            .expect("metric registration");

        let chain_send_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chain_send_latency_seconds",
                "On-chain send latency from submission to confirmation in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(chain_send_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            transactions_recorded_total,
            cards_issued_total,
            chain_sends_total,
            chain_send_failures_total,
            idempotent_replays_total,
            reconciliation_gaps_total,
            chain_send_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for WalletMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<WalletMetrics>;

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
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = WalletMetrics::new();
        metrics.transactions_recorded_total.inc();
        metrics.chain_sends_total.inc_by(3);

        let body = metrics.encode().unwrap();
        assert!(body.contains("arca_transactions_recorded_total 1"));
        assert!(body.contains("arca_chain_sends_total 3"));
        assert!(body.contains("arca_chain_send_latency_seconds"));
    }

    #[test]
    fn registries_are_independent() {
        let a = WalletMetrics::new();
        let b = WalletMetrics::new();
        a.cards_issued_total.inc();

        assert!(a.encode().unwrap().contains("arca_cards_issued_total 1"));
        assert!(b.encode().unwrap().contains("arca_cards_issued_total 0"));
    }
}
