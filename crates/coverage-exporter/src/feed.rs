use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use coverage_engine::domain::address::encode_producer_address;
use coverage_engine::domain::types::{BlockRecord, BlockTime, NewPeakEvent, PuzzleHash};
use coverage_engine::error::{Error, Result};
use coverage_engine::feed::traits::ChainFeed;

/// Chain feed over the node's HTTP RPC endpoint. Reconnects and timeouts
/// are reqwest's business; every failure surfaces as an ordinary feed error
/// and the next cycle retries from scratch.
pub struct HttpFeed {
    client: reqwest::Client,
    base: String,
    address_prefix: String,
}

#[derive(Serialize)]
struct BlocksRequest {
    start: u64,
    end: u64,
}

#[derive(Deserialize)]
struct PeakResponse {
    height: u64,
}

#[derive(Deserialize)]
struct BlocksResponse {
    blocks: Vec<WireBlock>,
}

#[derive(Deserialize)]
struct WireBlock {
    height: u64,
    timestamp: Option<i64>,
    transaction_block: bool,
    producer_puzzle_hash: String,
}

impl HttpFeed {
    pub fn new(base: &str, address_prefix: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Feed(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            address_prefix: address_prefix.to_string(),
        })
    }

    fn record_from_wire(&self, wire: WireBlock) -> Result<BlockRecord> {
        let raw = hex::decode(wire.producer_puzzle_hash.trim_start_matches("0x"))
            .map_err(|e| Error::Feed(format!("bad producer puzzle hash: {e}")))?;
        let producer_puzzle_hash: PuzzleHash = raw
            .try_into()
            .map_err(|_| Error::Feed("producer puzzle hash is not 32 bytes".to_string()))?;
        Ok(BlockRecord {
            height: wire.height,
            time: match wire.timestamp {
                Some(ts) => BlockTime::Resolved(ts),
                None => BlockTime::Pending,
            },
            is_transaction_block: wire.transaction_block,
            producer_address: encode_producer_address(&self.address_prefix, &producer_puzzle_hash),
            producer_puzzle_hash,
        })
    }
}

#[async_trait::async_trait]
impl ChainFeed for HttpFeed {
    async fn peak_height(&self) -> Result<u64> {
        let resp: PeakResponse = self
            .client
            .post(format!("{}/get_peak", self.base))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| Error::Feed(format!("get_peak: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Feed(format!("get_peak: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Feed(format!("get_peak decode: {e}")))?;
        Ok(resp.height)
    }

    async fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<BlockRecord>> {
        let resp: BlocksResponse = self
            .client
            .post(format!("{}/get_blocks", self.base))
            .json(&BlocksRequest { start, end })
            .send()
            .await
            .map_err(|e| Error::Feed(format!("get_blocks: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Feed(format!("get_blocks: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Feed(format!("get_blocks decode: {e}")))?;

        resp.blocks
            .into_iter()
            .map(|wire| self.record_from_wire(wire))
            .collect()
    }
}

/// Polls the node for a new peak and pushes it into the coalescing channel.
/// Stands in for a push subscription; a missed peak is harmless because the
/// gap filler re-derives anything skipped.
pub async fn poll_peaks<F: ChainFeed>(
    feed: std::sync::Arc<F>,
    tx: watch::Sender<NewPeakEvent>,
    interval: Duration,
) {
    let mut last = 0u64;
    loop {
        match feed.peak_height().await {
            Ok(height) if height > last => {
                debug!(height, "new peak observed");
                last = height;
                if tx.send(NewPeakEvent { height }).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "peak poll failed"),
        }
        tokio::time::sleep(interval).await;
    }
}
