use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::domain::types::{BlockRecord, BlockTime, HeightRange, gaps_in_sorted_heights};
use crate::error::{Error, Result};
use crate::store::traits::BlockStore;

#[derive(Default)]
pub struct MemoryBlockStore {
    inner: RwLock<BTreeMap<u64, BlockRecord>>,
}

impl MemoryBlockStore {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<u64, BlockRecord>>> {
        self.inner
            .read()
            .map_err(|_| Error::Store("poisoned lock".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<u64, BlockRecord>>> {
        self.inner
            .write()
            .map_err(|_| Error::Store("poisoned lock".to_string()))
    }
}

#[async_trait::async_trait]
impl BlockStore for MemoryBlockStore {
    async fn upsert(&self, record: BlockRecord) -> Result<()> {
        let mut guard = self.write()?;
        guard.insert(record.height, record);
        Ok(())
    }

    async fn get(&self, height: u64) -> Result<Option<BlockRecord>> {
        Ok(self.read()?.get(&height).cloned())
    }

    async fn min_height(&self) -> Result<Option<u64>> {
        Ok(self.read()?.keys().next().copied())
    }

    async fn max_height(&self) -> Result<Option<u64>> {
        Ok(self.read()?.keys().next_back().copied())
    }

    async fn range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<Vec<BlockRecord>> {
        let guard = self.read()?;
        Ok(guard
            .range((Bound::Excluded(start_exclusive), Bound::Included(end_inclusive)))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn count_range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<u64> {
        let guard = self.read()?;
        Ok(guard
            .range((Bound::Excluded(start_exclusive), Bound::Included(end_inclusive)))
            .count() as u64)
    }

    async fn gap_ranges(&self) -> Result<Vec<HeightRange>> {
        let guard = self.read()?;
        let heights: Vec<u64> = guard.keys().copied().collect();
        Ok(gaps_in_sorted_heights(&heights))
    }

    async fn pending_time_heights(&self) -> Result<Vec<u64>> {
        let guard = self.read()?;
        Ok(guard
            .values()
            .filter(|r| r.time.is_pending())
            .map(|r| r.height)
            .collect())
    }

    async fn set_time(&self, height: u64, timestamp: i64) -> Result<()> {
        let mut guard = self.write()?;
        match guard.get_mut(&height) {
            Some(record) => {
                record.time = BlockTime::Resolved(timestamp);
                Ok(())
            }
            None => Err(Error::Store(format!("set_time: no record at height {height}"))),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}
