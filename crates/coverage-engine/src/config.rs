use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Config {
    /// How many of the most recent blocks feed the coverage calculation.
    pub lookback_window: u64,
    /// Upper bound on blocks requested from the feed in one call.
    pub fetch_page_size: u64,
    /// How far below a block the timestamp borrow may reach.
    pub timestamp_search_distance: u64,
    /// Prefix prepended to the hex producer address encoding.
    pub address_prefix: String,
    /// Producers removed from the ranking in the adjusted variants.
    pub excluded_producers: BTreeSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookback_window: 32_256,
            fetch_page_size: 250,
            timestamp_search_distance: 10,
            address_prefix: "xch".to_string(),
            excluded_producers: BTreeSet::new(),
        }
    }
}
