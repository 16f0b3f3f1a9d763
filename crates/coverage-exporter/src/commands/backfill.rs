use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use coverage_engine::feed::traits::ChainFeed;
use coverage_engine::store::fs::FsBlockStore;
use coverage_engine::store::traits::BlockStore;
use coverage_engine::sync::gap_filler::GapFiller;

use crate::cli::Settings;
use crate::feed::HttpFeed;

/// Imports the node's full history from genesis into the local mirror.
pub async fn run(settings: &Settings, delete_first: bool) -> anyhow::Result<()> {
    let store = Arc::new(
        FsBlockStore::new(&settings.store_path)
            .with_context(|| format!("opening store at {}", settings.store_path.display()))?,
    );
    let feed = Arc::new(HttpFeed::new(&settings.node_url, &settings.engine.address_prefix)?);

    if delete_first {
        info!("clearing the existing mirror before import");
        store.clear().await?;
    }

    let peak = feed.peak_height().await?;
    info!(peak, "backfilling down to genesis");

    let filler = GapFiller::new(store.clone(), feed, &settings.engine);
    let extended = filler.extend_down_to(0, peak).await?;
    let filled = filler.fill_gaps().await?;

    let stored = store.count_range(0, peak).await? + u64::from(store.get(0).await?.is_some());
    info!(extended, filled, stored, "backfill complete");
    Ok(())
}
