use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins; the default keeps the
/// engine's per-cycle lines visible without debug noise.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
