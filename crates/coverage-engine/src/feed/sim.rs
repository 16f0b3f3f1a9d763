use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::address::encode_producer_address;
use crate::domain::types::{BlockRecord, BlockTime};
use crate::error::{Error, Result};
use crate::feed::traits::ChainFeed;

/// Scripted chain for tests and offline runs. Heights absent from the
/// script are simply not returned, which is how a real node behaves when
/// asked for blocks it does not have.
#[derive(Default)]
pub struct SimFeed {
    blocks: Mutex<BTreeMap<u64, BlockRecord>>,
    requested: Mutex<Vec<(u64, u64)>>,
}

impl SimFeed {
    pub fn insert(&self, record: BlockRecord) {
        let mut guard = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(record.height, record);
    }

    /// Convenience for scripting: transaction block with its own time.
    pub fn push_tx_block(&self, height: u64, timestamp: i64, producer: u8) {
        let hash = [producer; 32];
        self.insert(BlockRecord {
            height,
            time: BlockTime::Resolved(timestamp),
            is_transaction_block: true,
            producer_puzzle_hash: hash,
            producer_address: encode_producer_address("xch", &hash),
        });
    }

    /// Convenience for scripting: non-transaction block, time pending.
    pub fn push_non_tx_block(&self, height: u64, producer: u8) {
        let hash = [producer; 32];
        self.insert(BlockRecord {
            height,
            time: BlockTime::Pending,
            is_transaction_block: false,
            producer_puzzle_hash: hash,
            producer_address: encode_producer_address("xch", &hash),
        });
    }

    /// Every `[start, end)` pair handed to `fetch_range`, in call order.
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl ChainFeed for SimFeed {
    async fn peak_height(&self) -> Result<u64> {
        let guard = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| Error::Feed("sim feed has no blocks".to_string()))
    }

    async fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<BlockRecord>> {
        if start >= end {
            return Err(Error::InvalidParams("fetch_range: start must be below end"));
        }
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((start, end));
        let guard = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.range(start..end).map(|(_, r)| r.clone()).collect())
    }
}
