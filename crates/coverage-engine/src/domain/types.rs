use serde::{Deserialize, Serialize};

pub type PuzzleHash = [u8; 32];

/// Two-phase block time: non-transaction blocks arrive `Pending` and are
/// resolved later by borrowing from a nearby transaction block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlockTime {
    Pending,
    Resolved(i64),
}

impl BlockTime {
    pub fn is_pending(&self) -> bool {
        matches!(self, BlockTime::Pending)
    }

    pub fn resolved(&self) -> Option<i64> {
        match self {
            BlockTime::Pending => None,
            BlockTime::Resolved(ts) => Some(*ts),
        }
    }
}

/// One observed block. Heights are unique in any store; everything except
/// `time` is immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRecord {
    pub height: u64,
    pub time: BlockTime,
    pub is_transaction_block: bool,
    pub producer_puzzle_hash: PuzzleHash,
    pub producer_address: String,
}

/// Push notification from the chain feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPeakEvent {
    pub height: u64,
}

/// Inclusive run of heights absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightRange {
    pub start: u64,
    pub end: u64,
}

/// Outcome of one coverage calculation. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageResult {
    pub threshold_percent: u8,
    pub rank: usize,
    pub cumulative_share_percent: f64,
}

/// Maximal internal holes in an ascending height sequence. Runs below the
/// minimum or above the maximum stored height are not gaps.
pub fn gaps_in_sorted_heights(heights: &[u64]) -> Vec<HeightRange> {
    let mut gaps = Vec::new();
    for pair in heights.windows(2) {
        if pair[1] > pair[0] + 1 {
            gaps.push(HeightRange {
                start: pair[0] + 1,
                end: pair[1] - 1,
            });
        }
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_heights_have_no_gaps() {
        assert!(gaps_in_sorted_heights(&[5, 6, 7, 8]).is_empty());
        assert!(gaps_in_sorted_heights(&[]).is_empty());
        assert!(gaps_in_sorted_heights(&[42]).is_empty());
    }

    #[test]
    fn internal_holes_only() {
        let gaps = gaps_in_sorted_heights(&[10, 11, 14, 15, 20]);
        assert_eq!(
            gaps,
            vec![
                HeightRange { start: 12, end: 13 },
                HeightRange { start: 16, end: 19 },
            ]
        );
    }
}
