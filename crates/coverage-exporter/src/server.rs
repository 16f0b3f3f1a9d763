use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::info;

use coverage_engine::metrics::prom::PrometheusSink;

pub fn router(sink: Arc<PrometheusSink>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(|| async { "Ok" }))
        .with_state(sink)
}

async fn metrics(State(sink): State<Arc<PrometheusSink>>) -> Result<String, StatusCode> {
    sink.encode().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn serve_metrics(sink: Arc<PrometheusSink>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "metrics listener started");
    axum::serve(listener, router(sink)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_engine::metrics::sink::{GaugeId, MetricsSink};

    #[tokio::test]
    async fn metrics_endpoint_returns_exposition() {
        let sink = Arc::new(PrometheusSink::new().expect("sink"));
        sink.set_gauge(GaugeId::PeakHeight, 99.0);
        let body = metrics(State(sink)).await.expect("body");
        assert!(body.contains("peak_height 99"));
    }
}
