use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use coverage_engine::metrics::prom::PrometheusSink;
use coverage_engine::store::fs::FsBlockStore;
use coverage_engine::{feed::peak_channel, RefreshOrchestrator};

use crate::cli::Settings;
use crate::feed::{poll_peaks, HttpFeed};
use crate::server::serve_metrics;

pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let store = Arc::new(
        FsBlockStore::new(&settings.store_path)
            .with_context(|| format!("opening store at {}", settings.store_path.display()))?,
    );
    let feed = Arc::new(HttpFeed::new(&settings.node_url, &settings.engine.address_prefix)?);
    let sink = Arc::new(PrometheusSink::new()?);

    if !settings.engine.excluded_producers.is_empty() {
        info!(
            excluded = settings.engine.excluded_producers.len(),
            "adjusted gauges ignore configured producers"
        );
    }

    let orchestrator = Arc::new(RefreshOrchestrator::new(
        store,
        feed.clone(),
        sink.clone(),
        &settings.engine,
    ));

    let (peak_tx, peak_rx) = peak_channel();
    let poller = tokio::spawn(poll_peaks(feed, peak_tx, settings.poll_interval));
    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(peak_rx).await })
    };

    info!(node = %settings.node_url, port = settings.metrics_port, "following the chain");

    tokio::select! {
        result = serve_metrics(sink, settings.metrics_port) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    poller.abort();
    runner.abort();
    Ok(())
}
