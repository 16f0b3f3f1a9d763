use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::types::CoverageResult;
use crate::error::{Error, Result};
use crate::store::traits::BlockStore;

/// Computes the coverage coefficient: the smallest number of top producers
/// whose combined share of the lookback window reaches a threshold.
pub struct CoverageCalculator<S> {
    store: Arc<S>,
    lookback_window: u64,
}

impl<S: BlockStore> CoverageCalculator<S> {
    pub fn new(store: Arc<S>, lookback_window: u64) -> Self {
        Self {
            store,
            lookback_window,
        }
    }

    /// Coverage over the window `(peak - lookback, peak]`.
    ///
    /// Producers in `exclude` do not occupy a rank and their blocks count
    /// toward nobody, but the denominator stays the full window size: the
    /// adjusted metric is relative to the whole window, not renormalized
    /// over the remaining blocks.
    pub async fn coverage(
        &self,
        peak_height: u64,
        threshold_percent: u8,
        exclude: &BTreeSet<String>,
    ) -> Result<CoverageResult> {
        let floor = peak_height.saturating_sub(self.lookback_window);

        let have = self.store.count_range(floor, peak_height).await?;
        if have < self.lookback_window {
            // Still catching up; a degenerate answer over a short window
            // would be worse than no answer.
            return Err(Error::InsufficientHistory {
                required: self.lookback_window,
                have,
            });
        }

        // BTreeMap keeps grouping deterministic; the explicit sort below is
        // the total order the rank table is defined over.
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for record in self.store.range(floor, peak_height).await? {
            if exclude.contains(&record.producer_address) {
                continue;
            }
            *counts.entry(record.producer_address).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let threshold = f64::from(threshold_percent) / 100.0;
        let mut cumulative = 0u64;
        for (idx, (_, count)) in ranked.iter().enumerate() {
            cumulative += count;
            let cumulative_share = cumulative as f64 / self.lookback_window as f64;
            if cumulative_share >= threshold {
                return Ok(CoverageResult {
                    threshold_percent,
                    rank: idx + 1,
                    cumulative_share_percent: cumulative_share * 100.0,
                });
            }
        }

        // A correctly filled window always reaches the threshold; getting
        // here means the data under us is inconsistent.
        Err(Error::InconsistentRanking {
            threshold_percent,
            peak: peak_height,
        })
    }
}
