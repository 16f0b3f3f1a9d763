use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::executor::block_on;

use coverage_engine::Config;
use coverage_engine::RefreshOrchestrator;
use coverage_engine::domain::address::encode_producer_address;
use coverage_engine::domain::types::{BlockRecord, BlockTime, NewPeakEvent};
use coverage_engine::error::Error;
use coverage_engine::feed::peak_channel;
use coverage_engine::feed::sim::SimFeed;
use coverage_engine::feed::traits::ChainFeed;
use coverage_engine::metrics::sink::{GaugeId, MemorySink, MetricsSink};
use coverage_engine::store::memory::MemoryBlockStore;
use coverage_engine::store::traits::BlockStore;
use coverage_engine::sync::gap_filler::GapFiller;

fn mk_tx_record(height: u64, producer: u8) -> BlockRecord {
    let hash = [producer; 32];
    BlockRecord {
        height,
        time: BlockTime::Resolved(height as i64 * 10),
        is_transaction_block: true,
        producer_puzzle_hash: hash,
        producer_address: encode_producer_address("xch", &hash),
    }
}

fn small_config() -> Config {
    Config {
        lookback_window: 4,
        fetch_page_size: 250,
        ..Config::default()
    }
}

#[test]
fn gap_filler_fetches_exactly_the_missing_range() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        for h in 10..=15u64 {
            feed.push_tx_block(h, h as i64 * 10, b'A');
        }
        for h in [10u64, 11, 14, 15] {
            store.upsert(mk_tx_record(h, b'A')).await.expect("prefill");
        }

        let filler = GapFiller::new(store.clone(), feed.clone(), &small_config());
        let stored = filler.fill_gaps().await.expect("fill");

        assert_eq!(stored, 2);
        assert_eq!(feed.requested_ranges(), vec![(12, 14)]);
        assert!(store.gap_ranges().await.expect("gaps").is_empty());
        assert_eq!(store.count_range(9, 15).await.expect("count"), 6);
    });
}

#[test]
fn gap_filler_is_a_noop_on_a_contiguous_store() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        for h in 5..=9u64 {
            store.upsert(mk_tx_record(h, b'A')).await.expect("prefill");
        }

        let filler = GapFiller::new(store.clone(), feed.clone(), &small_config());
        let stored = filler.fill_gaps().await.expect("fill");

        assert_eq!(stored, 0);
        assert!(feed.requested_ranges().is_empty());
    });
}

#[test]
fn large_gaps_are_fetched_in_backward_pages() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        for h in 11..=18u64 {
            feed.push_tx_block(h, h as i64 * 10, b'A');
        }
        store.upsert(mk_tx_record(11, b'A')).await.expect("prefill");
        store.upsert(mk_tx_record(18, b'A')).await.expect("prefill");

        let config = Config {
            fetch_page_size: 2,
            ..small_config()
        };
        let filler = GapFiller::new(store.clone(), feed.clone(), &config);
        filler.fill_gaps().await.expect("fill");

        assert_eq!(feed.requested_ranges(), vec![(16, 18), (14, 16), (12, 14)]);
        assert!(store.gap_ranges().await.expect("gaps").is_empty());
    });
}

#[test]
fn empty_fetch_aborts_the_pass_but_keeps_progress() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        // The feed can serve 12..13 but knows nothing of 16..17.
        feed.push_tx_block(12, 120, b'B');
        feed.push_tx_block(13, 130, b'B');
        for h in [10u64, 11, 14, 15, 18] {
            store.upsert(mk_tx_record(h, b'A')).await.expect("prefill");
        }

        let filler = GapFiller::new(store.clone(), feed.clone(), &small_config());
        let err = filler.fill_gaps().await.expect_err("second gap must fail");
        assert!(matches!(err, Error::EmptyFetch { start: 16, end: 18 }));

        // First gap's progress stays committed; the retry is cheap.
        assert_eq!(store.get(12).await.expect("get").map(|r| r.height), Some(12));
        assert_eq!(store.get(13).await.expect("get").map(|r| r.height), Some(13));
        assert_eq!(
            store.gap_ranges().await.expect("gaps"),
            vec![coverage_engine::domain::types::HeightRange { start: 16, end: 17 }]
        );
    });
}

#[test]
fn backfilled_non_tx_blocks_get_resolved_times() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        feed.push_tx_block(20, 200, b'A');
        feed.push_non_tx_block(21, b'B');
        feed.push_non_tx_block(22, b'B');
        feed.push_tx_block(23, 230, b'A');
        store.upsert(mk_tx_record(19, b'A')).await.expect("prefill");
        store.upsert(mk_tx_record(24, b'A')).await.expect("prefill");

        let filler = GapFiller::new(store.clone(), feed.clone(), &small_config());
        filler.fill_gaps().await.expect("fill");

        // Both non-transaction blocks borrowed from the tx block at 20.
        let b21 = store.get(21).await.expect("get").expect("present");
        let b22 = store.get(22).await.expect("get").expect("present");
        assert_eq!(b21.time, BlockTime::Resolved(200));
        assert_eq!(b22.time, BlockTime::Resolved(200));

        // Ordering invariant: each resolved non-tx block has a lower block
        // within the search distance whose time is not newer.
        for record in store.range(18, 24).await.expect("range") {
            if record.is_transaction_block {
                continue;
            }
            let Some(ts) = record.time.resolved() else { continue };
            let band = store
                .range(record.height.saturating_sub(10), record.height - 1)
                .await
                .expect("band");
            assert!(band.iter().any(|r| r.time.resolved().is_some_and(|t| t <= ts)));
        }
    });
}

#[test]
fn empty_store_seeds_from_peak_and_extends_to_floor() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        for h in 0..=20u64 {
            feed.push_tx_block(h, h as i64 * 10, b'A');
        }

        let config = Config {
            fetch_page_size: 5,
            ..small_config()
        };
        let filler = GapFiller::new(store.clone(), feed.clone(), &config);
        filler.extend_down_to(10, 20).await.expect("extend");

        // First window is [peak - page, peak], then backward pages to the floor.
        assert_eq!(feed.requested_ranges(), vec![(15, 21), (10, 15)]);
        assert_eq!(store.min_height().await.expect("min"), Some(10));
        assert_eq!(store.max_height().await.expect("max"), Some(20));
        assert!(store.gap_ranges().await.expect("gaps").is_empty());
    });
}

#[test]
fn full_backfill_reaches_height_zero() {
    block_on(async {
        let store = Arc::new(MemoryBlockStore::default());
        let feed = Arc::new(SimFeed::default());
        for h in 0..=12u64 {
            feed.push_tx_block(h, h as i64 * 10, b'A');
        }

        let config = Config {
            fetch_page_size: 5,
            ..small_config()
        };
        let filler = GapFiller::new(store.clone(), feed.clone(), &config);
        filler.extend_down_to(0, 12).await.expect("backfill");

        assert_eq!(store.min_height().await.expect("min"), Some(0));
        assert_eq!(store.count_range(0, 12).await.expect("count"), 12);
        assert_eq!(store.get(0).await.expect("get").map(|r| r.height), Some(0));
    });
}

/// Feed wrapper that tracks how many multi-block fetches run at once.
/// Single-block fetches are live peak ingestion and may overlap; ranges
/// wider than one block only happen inside a compute cycle.
struct ProbeFeed {
    inner: SimFeed,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl ProbeFeed {
    fn new(inner: SimFeed) -> Self {
        Self {
            inner,
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ChainFeed for ProbeFeed {
    async fn peak_height(&self) -> coverage_engine::Result<u64> {
        self.inner.peak_height().await
    }

    async fn fetch_range(&self, start: u64, end: u64) -> coverage_engine::Result<Vec<BlockRecord>> {
        let structural = end > start + 1;
        if structural {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let result = self.inner.fetch_range(start, end).await;
        if structural {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_notifications_publish_the_maximum_peak() {
    let store = Arc::new(MemoryBlockStore::default());
    let feed = SimFeed::default();
    for h in 0..=60u64 {
        feed.push_tx_block(h, h as i64 * 10, if h % 3 == 0 { b'A' } else { b'B' });
    }
    let feed = Arc::new(ProbeFeed::new(feed));
    let sink = Arc::new(MemorySink::default());

    // Seeded contiguously up to 40; the notifications land above that.
    for h in 0..=40u64 {
        store
            .upsert(mk_tx_record(h, if h % 3 == 0 { b'A' } else { b'B' }))
            .await
            .expect("prefill");
    }

    let config = Config {
        lookback_window: 10,
        fetch_page_size: 50,
        ..Config::default()
    };
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        store.clone(),
        feed.clone(),
        sink.clone(),
        &config,
    ));

    let mut handles = Vec::new();
    for height in [41u64, 55, 48, 60, 44, 52, 59, 47] {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.handle_new_peak(NewPeakEvent { height }).await;
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    // Compute cycles are single-flight, so the feed never saw overlapping
    // structural fetches, and the last published peak is the maximum.
    assert!(feed.max_in_flight.load(Ordering::SeqCst) <= 1);
    assert_eq!(orchestrator.recorded_peak(), 60);
    assert_eq!(sink.get(GaugeId::PeakHeight), Some(60.0));
    assert!(sink.get(GaugeId::Coverage50).is_some());
    assert!(sink.get(GaugeId::Coverage51).is_some());

    // No height was stored twice and the mirror ends up contiguous.
    assert_eq!(store.count_range(0, 60).await.expect("count"), 60);
    assert!(store.get(0).await.expect("get").is_some());
    assert!(store.gap_ranges().await.expect("gaps").is_empty());
}

#[tokio::test]
async fn stale_notifications_do_not_recompute() {
    let store = Arc::new(MemoryBlockStore::default());
    let feed = Arc::new(SimFeed::default());
    for h in 0..=30u64 {
        feed.push_tx_block(h, h as i64 * 10, b'A');
    }
    let sink = Arc::new(MemorySink::default());
    let config = Config {
        lookback_window: 5,
        fetch_page_size: 50,
        ..Config::default()
    };
    let orchestrator = RefreshOrchestrator::new(store, feed, sink.clone(), &config);

    orchestrator.refresh(30).await;
    assert_eq!(sink.get(GaugeId::PeakHeight), Some(30.0));

    // A lower or equal peak never advances the tracker, so the gauges from
    // the newer cycle stay put.
    sink.set_gauge(GaugeId::PeakHeight, -1.0);
    orchestrator.refresh(25).await;
    orchestrator.refresh(30).await;
    assert_eq!(sink.get(GaugeId::PeakHeight), Some(-1.0));
    assert_eq!(orchestrator.recorded_peak(), 30);
}

#[tokio::test]
async fn insufficient_history_skips_publication() {
    let store = Arc::new(MemoryBlockStore::default());
    let feed = Arc::new(SimFeed::default());
    // The feed only knows the last eleven blocks of a chain that would need
    // a hundred for the window.
    for h in 50..=60u64 {
        feed.push_tx_block(h, h as i64 * 10, b'A');
    }
    let sink = Arc::new(MemorySink::default());
    let config = Config {
        lookback_window: 100,
        fetch_page_size: 250,
        ..Config::default()
    };
    let orchestrator = RefreshOrchestrator::new(store.clone(), feed, sink.clone(), &config);

    orchestrator.handle_new_peak(NewPeakEvent { height: 60 }).await;

    assert_eq!(orchestrator.recorded_peak(), 60);
    assert_eq!(sink.get(GaugeId::PeakHeight), None);
    assert_eq!(sink.get(GaugeId::Coverage50), None);
}

#[tokio::test]
async fn peak_channel_coalesces_to_the_latest_event() {
    let store = Arc::new(MemoryBlockStore::default());
    let feed = Arc::new(SimFeed::default());
    for h in 0..=40u64 {
        feed.push_tx_block(h, h as i64 * 10, b'A');
    }
    let sink = Arc::new(MemorySink::default());
    let config = Config {
        lookback_window: 8,
        fetch_page_size: 50,
        ..Config::default()
    };
    let orchestrator = Arc::new(RefreshOrchestrator::new(store, feed, sink.clone(), &config));

    let (tx, rx) = peak_channel();
    // All three land before the consumer starts; only the latest matters.
    tx.send(NewPeakEvent { height: 33 }).expect("send");
    tx.send(NewPeakEvent { height: 35 }).expect("send");
    tx.send(NewPeakEvent { height: 38 }).expect("send");

    let consumer = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(rx).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    drop(tx);
    consumer.await.expect("consumer");

    assert_eq!(orchestrator.recorded_peak(), 38);
    assert_eq!(sink.get(GaugeId::PeakHeight), Some(38.0));
}
