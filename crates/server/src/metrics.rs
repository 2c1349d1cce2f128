//! Prometheus metrics

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder; call once at startup
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    let _ = HANDLE.set(handle.clone());
    handle
}

/// `/metrics` endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match HANDLE.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}
