use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::coverage::calculator::CoverageCalculator;
use crate::domain::types::{BlockTime, NewPeakEvent};
use crate::error::{Error, Result};
use crate::feed::traits::ChainFeed;
use crate::metrics::sink::{GaugeId, MetricsSink};
use crate::store::traits::BlockStore;
use crate::sync::gap_filler::GapFiller;
use crate::sync::timestamps::TimestampResolver;

/// Reacts to new-peak notifications: persists the notified block, drives the
/// gap filler, runs the four coverage variants and publishes the gauges.
///
/// Latest-wins, no queueing, no internal retry: at most one compute cycle is
/// in flight, a burst of notifications coalesces to the newest peak, and a
/// failed cycle waits for the next notification instead of looping.
pub struct RefreshOrchestrator<S, F, M> {
    store: Arc<S>,
    feed: Arc<F>,
    sink: Arc<M>,
    gap_filler: GapFiller<S, F>,
    calculator: CoverageCalculator<S>,
    resolver: TimestampResolver,
    peak: super::peak::PeakTracker,
    compute_lock: Mutex<()>,
    lookback_window: u64,
    excluded: BTreeSet<String>,
}

impl<S, F, M> RefreshOrchestrator<S, F, M>
where
    S: BlockStore,
    F: ChainFeed,
    M: MetricsSink,
{
    pub fn new(store: Arc<S>, feed: Arc<F>, sink: Arc<M>, config: &Config) -> Self {
        Self {
            gap_filler: GapFiller::new(store.clone(), feed.clone(), config),
            calculator: CoverageCalculator::new(store.clone(), config.lookback_window),
            resolver: TimestampResolver::new(config.timestamp_search_distance),
            peak: super::peak::PeakTracker::default(),
            compute_lock: Mutex::new(()),
            lookback_window: config.lookback_window,
            excluded: config.excluded_producers.clone(),
            store,
            feed,
            sink,
        }
    }

    pub fn recorded_peak(&self) -> u64 {
        self.peak.current()
    }

    /// Consumes the coalescing peak channel until the sender side closes.
    pub async fn run(&self, mut peaks: watch::Receiver<NewPeakEvent>) {
        while peaks.changed().await.is_ok() {
            let event = *peaks.borrow_and_update();
            self.handle_new_peak(event).await;
        }
    }

    pub async fn handle_new_peak(&self, event: NewPeakEvent) {
        if let Err(e) = self.ingest_peak(event).await {
            warn!(height = event.height, error = %e, "could not ingest notified block");
        }
        self.refresh(event.height).await;
    }

    /// Persists the notified block. This only ever appends at or above the
    /// stored maximum, so it stays outside the gap-fill critical section.
    async fn ingest_peak(&self, event: NewPeakEvent) -> Result<()> {
        let blocks = self
            .feed
            .fetch_range(event.height, event.height + 1)
            .await?;
        let Some(mut block) = blocks.into_iter().next() else {
            // The notifying node can be slightly ahead of the node serving
            // fetches; the gap filler picks the block up later.
            debug!(height = event.height, "notified block not fetchable yet");
            return Ok(());
        };
        if !block.is_transaction_block
            && block.time.is_pending()
            && let Some(ts) = self.resolver.resolve(self.store.as_ref(), block.height).await?
        {
            block.time = BlockTime::Resolved(ts);
        }
        self.store.upsert(block).await
    }

    /// One latest-wins refresh. Returns without computing when the height
    /// does not advance the recorded peak, or when a newer peak was recorded
    /// while this one waited for the compute lock.
    pub async fn refresh(&self, peak_height: u64) {
        if !self.peak.try_advance(peak_height) {
            return;
        }

        let _cycle = self.compute_lock.lock().await;
        if peak_height < self.peak.current() {
            debug!(height = peak_height, "peak superseded while waiting, skipping cycle");
            return;
        }

        match self.run_cycle(peak_height).await {
            Ok(()) => {}
            Err(e @ Error::InsufficientHistory { .. }) => {
                // Expected while the backfill catches up. Gauges keep their
                // previous values for this cycle.
                info!(height = peak_height, error = %e, "skipping gauge publication");
            }
            Err(e) => {
                error!(height = peak_height, error = %e, "refresh cycle failed");
            }
        }
    }

    async fn run_cycle(&self, peak_height: u64) -> Result<()> {
        let floor = peak_height.saturating_sub(self.lookback_window);
        self.gap_filler.extend_down_to(floor, peak_height).await?;
        self.gap_filler.fill_gaps().await?;

        let unadjusted = BTreeSet::new();
        let c50 = self.calculator.coverage(peak_height, 50, &unadjusted).await?;
        let c51 = self.calculator.coverage(peak_height, 51, &unadjusted).await?;
        let a50 = self.calculator.coverage(peak_height, 50, &self.excluded).await?;
        let a51 = self.calculator.coverage(peak_height, 51, &self.excluded).await?;

        if self.peak.current() > peak_height {
            // Publish anyway; the newer notification triggers a fresh cycle.
            debug!(
                height = peak_height,
                newest = self.peak.current(),
                "peak advanced during computation, publishing stale-but-valid gauges"
            );
        }

        self.sink.set_gauge(GaugeId::Coverage50, c50.rank as f64);
        self.sink.set_gauge(GaugeId::Coverage51, c51.rank as f64);
        self.sink.set_gauge(GaugeId::Coverage50Adjusted, a50.rank as f64);
        self.sink.set_gauge(GaugeId::Coverage51Adjusted, a51.rank as f64);
        self.sink.set_gauge(GaugeId::PeakHeight, peak_height as f64);

        info!(
            height = peak_height,
            coverage_50 = c50.rank,
            coverage_51 = c51.rank,
            "published coverage gauges"
        );
        Ok(())
    }

    pub fn gap_filler(&self) -> &GapFiller<S, F> {
        &self.gap_filler
    }

    pub fn calculator(&self) -> &CoverageCalculator<S> {
        &self.calculator
    }
}
