use crate::domain::types::BlockRecord;
use crate::error::Result;

/// Pull side of the chain node. Push notifications arrive separately over
/// the peak channel; a missed notification is harmless because the gap
/// filler re-derives anything skipped.
#[async_trait::async_trait]
pub trait ChainFeed: Send + Sync {
    async fn peak_height(&self) -> Result<u64>;
    /// Blocks with height in `[start, end)`. `end` is exclusive everywhere
    /// in this engine; callers add 1 where an inclusive bound is needed.
    async fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<BlockRecord>>;
}
