use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::types::{BlockTime, HeightRange};
use crate::error::{Error, Result};
use crate::feed::traits::ChainFeed;
use crate::store::traits::BlockStore;
use crate::sync::timestamps::TimestampResolver;

/// Keeps the stored height range contiguous. Holes appear when peak
/// notifications are missed or arrive out of order; this fetches the missing
/// ranges from the feed in bounded pages. Safe to call repeatedly and
/// concurrently with live ingestion; structural work is serialized on an
/// internal lock so two fillers never interleave partial ranges.
pub struct GapFiller<S, F> {
    store: Arc<S>,
    feed: Arc<F>,
    resolver: TimestampResolver,
    page_size: u64,
    fill_lock: Mutex<()>,
}

impl<S: BlockStore, F: ChainFeed> GapFiller<S, F> {
    pub fn new(store: Arc<S>, feed: Arc<F>, config: &Config) -> Self {
        Self {
            store,
            feed,
            resolver: TimestampResolver::new(config.timestamp_search_distance),
            page_size: config.fetch_page_size,
            fill_lock: Mutex::new(()),
        }
    }

    /// Fills every internal hole, lowest first. The order is mandatory:
    /// a non-transaction block borrows its time from a preceding block, so
    /// the preceding range has to be present before the following one is
    /// resolved. Returns the number of blocks stored.
    pub async fn fill_gaps(&self) -> Result<u64> {
        let _guard = self.fill_lock.lock().await;

        let gaps = self.store.gap_ranges().await?;
        if !gaps.is_empty() {
            info!(gaps = gaps.len(), "filling height gaps");
        }

        let mut stored = 0;
        for gap in gaps {
            stored += self.fill_one_gap(gap).await?;
        }
        self.resolve_pending().await?;
        Ok(stored)
    }

    /// Seeds an empty store from `[peak - page, peak]` and extends the
    /// lowest stored height down to `floor` in the same backward pages as a
    /// gap. Used for the lookback requirement on the live path and for the
    /// full-history backfill (floor 0).
    pub async fn extend_down_to(&self, floor: u64, peak: u64) -> Result<u64> {
        let _guard = self.fill_lock.lock().await;

        let mut stored = 0;
        let mut lowest = match self.store.min_height().await? {
            Some(min) => min,
            None => {
                let start = peak.saturating_sub(self.page_size);
                stored += self.fetch_and_store(start, peak + 1).await?;
                self.resolve_pending().await?;
                start
            }
        };

        while lowest > floor && lowest > 0 {
            let start = lowest.saturating_sub(self.page_size);
            stored += self.fetch_and_store(start, lowest).await?;
            self.resolve_pending().await?;
            lowest = start;
        }
        Ok(stored)
    }

    async fn fill_one_gap(&self, gap: HeightRange) -> Result<u64> {
        // Backward pages, so no single request exceeds the page size.
        let mut end = gap.end + 1;
        let mut start = end.saturating_sub(self.page_size).max(gap.start);
        let mut stored = 0;
        loop {
            stored += self.fetch_and_store(start, end).await?;
            if start <= gap.start {
                break;
            }
            end = start;
            start = end.saturating_sub(self.page_size).max(gap.start);
            // Resolve between batches rather than deferring to the end, so
            // freshly stored transaction blocks can lend their time upward.
            self.resolve_pending().await?;
        }
        Ok(stored)
    }

    async fn fetch_and_store(&self, start: u64, end: u64) -> Result<u64> {
        debug!(start, end, "fetching blocks");
        let blocks = self.feed.fetch_range(start, end).await?;
        if blocks.is_empty() {
            // The feed not knowing a range we derived from stored heights
            // means it is unavailable or the range is invalid; abort the
            // pass. Everything stored so far stays committed for the retry.
            return Err(Error::EmptyFetch { start, end });
        }

        let mut stored = 0;
        for mut block in blocks {
            if !block.is_transaction_block
                && block.time.is_pending()
                && let Some(ts) = self.resolver.resolve(self.store.as_ref(), block.height).await?
            {
                block.time = BlockTime::Resolved(ts);
            }
            self.store.upsert(block).await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Re-runs timestamp inference over every still-pending record.
    pub async fn resolve_pending(&self) -> Result<()> {
        for height in self.store.pending_time_heights().await? {
            if let Some(ts) = self.resolver.resolve(self.store.as_ref(), height).await? {
                self.store.set_time(height, ts).await?;
            }
        }
        Ok(())
    }
}
