use crate::error::Result;
use crate::store::traits::BlockStore;

/// Infers a time for a block that has none by borrowing from the nearest
/// strictly-lower height with a resolved time. The search band is bounded
/// so a much older time is never attributed to a later block, and it never
/// looks upward: future times may not exist yet.
#[derive(Debug, Clone, Copy)]
pub struct TimestampResolver {
    search_distance: u64,
}

impl TimestampResolver {
    pub fn new(search_distance: u64) -> Self {
        Self { search_distance }
    }

    /// Nearest resolved time in `(height - distance, height)`, closest wins.
    /// Read-only; the caller persists the result.
    pub async fn resolve<S: BlockStore>(&self, store: &S, height: u64) -> Result<Option<i64>> {
        if height == 0 {
            return Ok(None);
        }
        let band = if height < self.search_distance {
            // The band's open lower bound sits below genesis here, so height
            // 0 is inside it; the exclusive range query alone would skip it.
            let mut band = match store.get(0).await? {
                Some(genesis) => vec![genesis],
                None => Vec::new(),
            };
            band.extend(store.range(0, height - 1).await?);
            band
        } else {
            store.range(height - self.search_distance, height - 1).await?
        };
        Ok(band.iter().rev().find_map(|r| r.time.resolved()))
    }
}
