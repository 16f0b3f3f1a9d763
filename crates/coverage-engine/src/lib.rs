pub mod config;
pub mod coverage;
pub mod domain;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod refresh;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use refresh::orchestrator::RefreshOrchestrator;
