#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("feed error: {0}")]
    Feed(String),
    #[error("feed returned no blocks for heights [{start}, {end})")]
    EmptyFetch { start: u64, end: u64 },
    #[error("insufficient history: window needs {required} blocks, have {have}")]
    InsufficientHistory { required: u64, have: u64 },
    #[error("no rank reached {threshold_percent}% of the window ending at height {peak}")]
    InconsistentRanking { threshold_percent: u8, peak: u64 },
    #[error("store error: {0}")]
    Store(String),
    #[error("metrics error: {0}")]
    Metrics(String),
    #[error("invalid params: {0}")]
    InvalidParams(&'static str),
}

impl Error {
    /// True for failures where retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Feed(_) | Error::EmptyFetch { .. } | Error::InsufficientHistory { .. }
        )
    }
}

pub type Result<T> = core::result::Result<T, Error>;
