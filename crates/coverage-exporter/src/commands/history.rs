use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use coverage_engine::coverage::calculator::CoverageCalculator;
use coverage_engine::store::fs::FsBlockStore;
use coverage_engine::store::traits::BlockStore;
use coverage_engine::sync::timestamps::TimestampResolver;
use coverage_engine::Config;

use crate::cli::Settings;

/// Replays coverage over the stored history and writes one CSV row per
/// sampled height. Reads only the local mirror; run backfill-blocks first.
pub async fn run(settings: &Settings, interval: u64, output: &Path) -> anyhow::Result<()> {
    if interval == 0 {
        anyhow::bail!("interval must be at least 1");
    }
    let store = Arc::new(
        FsBlockStore::new(&settings.store_path)
            .with_context(|| format!("opening store at {}", settings.store_path.display()))?,
    );

    let csv = render_history(store, &settings.engine, interval).await?;
    std::fs::write(output, &csv)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(output = %output.display(), rows = csv.lines().count() - 1, "history written");
    Ok(())
}

async fn render_history<S: BlockStore>(
    store: Arc<S>,
    config: &Config,
    interval: u64,
) -> anyhow::Result<String> {
    let oldest = store.min_height().await?;
    let newest = store.max_height().await?;
    let (Some(oldest), Some(newest)) = (oldest, newest) else {
        anyhow::bail!("the local mirror is empty");
    };

    let calculator = CoverageCalculator::new(store.clone(), config.lookback_window);
    let resolver = TimestampResolver::new(config.timestamp_search_distance);
    let none = BTreeSet::new();

    let mut out = String::from("height,date,nc50,nc51\n");
    let mut height = oldest + config.lookback_window;
    while height <= newest {
        // Historical gaps or short tails turn into a zero row rather than
        // aborting the whole export.
        let nc50 = match calculator.coverage(height, 50, &none).await {
            Ok(result) => result.rank,
            Err(e) => {
                warn!(height, error = %e, "no 50% figure at this height");
                0
            }
        };
        let nc51 = match calculator.coverage(height, 51, &none).await {
            Ok(result) => result.rank,
            Err(e) => {
                warn!(height, error = %e, "no 51% figure at this height");
                0
            }
        };

        let date = match store.get(height).await? {
            Some(record) => match record.time.resolved() {
                Some(ts) => ts,
                None => resolver.resolve(store.as_ref(), height).await?.unwrap_or(0),
            },
            None => 0,
        };

        out.push_str(&format!("{height},{date},{nc50},{nc51}\n"));
        height += interval;
    }
    Ok(out)
}
