//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - RPC request outcomes and fallbacks per endpoint
//! - Swap status checks
//! - Priority fee fallbacks
//! - Client connectivity per network

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref RPC_REQUESTS: CounterVec = register_counter_vec!(
        "meson_rpc_requests_total",
        "RPC requests by endpoint and outcome",
        &["endpoint", "status"]
    ).unwrap();

    pub static ref RPC_FALLBACKS: CounterVec = register_counter_vec!(
        "meson_rpc_fallbacks_total",
        "Requests answered by a non-primary endpoint",
        &["endpoint"]
    ).unwrap();

    pub static ref STATUS_CHECKS: CounterVec = register_counter_vec!(
        "meson_status_checks_total",
        "Swap status reconciliations by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref FEE_FALLBACKS: CounterVec = register_counter_vec!(
        "meson_fee_fallbacks_total",
        "Priority fee recommendations that used the fixed fallback",
        &["network"]
    ).unwrap();

    pub static ref CLIENT_CONNECTED: GaugeVec = register_gauge_vec!(
        "meson_client_connected",
        "Network client status (1=healthy, 0=unhealthy)",
        &["network"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Text exposition of every registered metric
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

pub fn record_rpc_failure(endpoint: &str) {
    RPC_REQUESTS.with_label_values(&[endpoint, "error"]).inc();
}

pub fn record_rpc_fallback(endpoint: &str) {
    RPC_REQUESTS.with_label_values(&[endpoint, "ok"]).inc();
    RPC_FALLBACKS.with_label_values(&[endpoint]).inc();
}

pub fn record_status_check(outcome: &str) {
    STATUS_CHECKS.with_label_values(&[outcome]).inc();
}

pub fn record_fee_fallback(network: &str) {
    FEE_FALLBACKS.with_label_values(&[network]).inc();
}

pub fn record_client_health(network: &str, healthy: bool) {
    CLIENT_CONNECTED
        .with_label_values(&[network])
        .set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_rendered() {
        record_fee_fallback("metrics-test-net");
        record_client_health("metrics-test-net", true);

        let text = render().unwrap();
        assert!(text.contains("meson_fee_fallbacks_total"));
        assert!(text.contains("meson_client_connected{network=\"metrics-test-net\"} 1"));
    }
}
