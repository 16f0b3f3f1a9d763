use crate::domain::types::{BlockRecord, HeightRange};
use crate::error::Result;

/// Durable table of block records keyed by height. Height is the primary
/// identity; `upsert` on a present height overwrites instead of duplicating.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    async fn upsert(&self, record: BlockRecord) -> Result<()>;
    async fn get(&self, height: u64) -> Result<Option<BlockRecord>>;
    async fn min_height(&self) -> Result<Option<u64>>;
    async fn max_height(&self) -> Result<Option<u64>>;
    /// Records with height in `(start_exclusive, end_inclusive]`, ascending.
    async fn range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<Vec<BlockRecord>>;
    async fn count_range(&self, start_exclusive: u64, end_inclusive: u64) -> Result<u64>;
    /// Maximal runs of missing heights strictly between the stored minimum
    /// and maximum.
    async fn gap_ranges(&self) -> Result<Vec<HeightRange>>;
    /// Heights whose time is still pending, ascending.
    async fn pending_time_heights(&self) -> Result<Vec<u64>>;
    /// Resolve the time of an already-stored record.
    async fn set_time(&self, height: u64, timestamp: i64) -> Result<()>;
    /// Bulk reset. Only used when re-seeding from scratch.
    async fn clear(&self) -> Result<()>;
}
