use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use coverage_engine::Config;

#[derive(Debug, Parser)]
#[command(
    name = "coverage-exporter",
    about = "Mirrors block production history and exports coverage-coefficient gauges"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

const DEFAULT_NODE_URL: &str = "http://localhost:8555";
const DEFAULT_STORE_PATH: &str = "./coverage-data";
const DEFAULT_METRICS_PORT: u16 = 9914;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Flags are `Option` so an explicitly set flag is distinguishable from a
/// default. Precedence in `resolve` is flag (or env) > config file > default.
#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Optional JSON config file; flags given on the command line win.
    #[arg(long, env = "COVERAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// How many recent blocks feed the coverage calculation [default: 32256].
    #[arg(long, env = "COVERAGE_LOOKBACK_WINDOW")]
    pub lookback_window: Option<u64>,

    /// How many blocks to request from the node per call [default: 250].
    #[arg(long, env = "COVERAGE_FETCH_PAGE_SIZE")]
    pub fetch_page_size: Option<u64>,

    /// Base URL of the chain node RPC endpoint [default: http://localhost:8555].
    #[arg(long, env = "COVERAGE_NODE_URL")]
    pub node_url: Option<String>,

    /// Port the metrics server binds to [default: 9914].
    #[arg(long, env = "COVERAGE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Producer addresses ignored by the adjusted coverage variants.
    #[arg(long = "excluded-producer", env = "COVERAGE_EXCLUDED_PRODUCERS", value_delimiter = ',')]
    pub excluded_producers: Vec<String>,

    /// Directory the block mirror lives in [default: ./coverage-data].
    #[arg(long, env = "COVERAGE_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Prefix for derived producer addresses [default: xch].
    #[arg(long, env = "COVERAGE_ADDRESS_PREFIX")]
    pub address_prefix: Option<String>,

    /// Seconds between peak polls of the node [default: 5].
    #[arg(long, env = "COVERAGE_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the chain and serve the coverage gauges.
    Serve,
    /// Backfill the full block history from the node into the store.
    BackfillBlocks {
        /// Clear the store before importing.
        #[arg(long)]
        delete_first: bool,
    },
    /// Write a CSV of historical coverage figures from the local mirror.
    HistoricalOutput {
        /// Heights between consecutive data points.
        #[arg(long, default_value_t = 100)]
        interval: u64,
        #[arg(long, default_value = "history.csv")]
        output: PathBuf,
    },
}

/// Everything the commands need, resolved from flags, env and config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: Config,
    pub node_url: String,
    pub metrics_port: u16,
    pub store_path: PathBuf,
    pub poll_interval: Duration,
}

/// File-level overrides; every field optional so a partial file is fine.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    lookback_window: Option<u64>,
    fetch_page_size: Option<u64>,
    node_url: Option<String>,
    metrics_port: Option<u16>,
    excluded_producers: Option<Vec<String>>,
    store_path: Option<PathBuf>,
    address_prefix: Option<String>,
    poll_interval_secs: Option<u64>,
}

impl GlobalOpts {
    pub fn resolve(&self) -> anyhow::Result<Settings> {
        let file = match &self.config {
            Some(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_slice::<FileConfig>(&bytes)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        let excluded: BTreeSet<String> = if self.excluded_producers.is_empty() {
            file.excluded_producers.unwrap_or_default().into_iter().collect()
        } else {
            self.excluded_producers.iter().cloned().collect()
        };

        let defaults = Config::default();
        let engine = Config {
            lookback_window: self
                .lookback_window
                .or(file.lookback_window)
                .unwrap_or(defaults.lookback_window),
            fetch_page_size: self
                .fetch_page_size
                .or(file.fetch_page_size)
                .unwrap_or(defaults.fetch_page_size),
            timestamp_search_distance: defaults.timestamp_search_distance,
            address_prefix: self
                .address_prefix
                .clone()
                .or(file.address_prefix)
                .unwrap_or(defaults.address_prefix),
            excluded_producers: excluded,
        };

        Ok(Settings {
            engine,
            node_url: self
                .node_url
                .clone()
                .or(file.node_url)
                .unwrap_or_else(|| DEFAULT_NODE_URL.to_string()),
            metrics_port: self
                .metrics_port
                .or(file.metrics_port)
                .unwrap_or(DEFAULT_METRICS_PORT),
            store_path: self
                .store_path
                .clone()
                .or(file.store_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            poll_interval: Duration::from_secs(
                self.poll_interval_secs
                    .or(file.poll_interval_secs)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
        })
    }
}
