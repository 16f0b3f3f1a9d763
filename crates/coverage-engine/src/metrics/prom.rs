use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::metrics::sink::{GaugeId, MetricsSink};

const NAMESPACE: &str = "chain";
const SUBSYSTEM: &str = "block_metrics";

/// Prometheus-backed sink. Holds its own registry so only these gauges are
/// exported, not the default process collectors.
pub struct PrometheusSink {
    registry: Registry,
    coverage_50: Gauge,
    coverage_51: Gauge,
    coverage_50_adjusted: Gauge,
    coverage_51_adjusted: Gauge,
    peak_height: Gauge,
}

fn new_gauge(registry: &Registry, id: GaugeId) -> Result<Gauge> {
    let opts = Opts::new(id.name(), id.help())
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM);
    let gauge = Gauge::with_opts(opts).map_err(|e| Error::Metrics(e.to_string()))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Metrics(e.to_string()))?;
    Ok(gauge)
}

impl PrometheusSink {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            coverage_50: new_gauge(&registry, GaugeId::Coverage50)?,
            coverage_51: new_gauge(&registry, GaugeId::Coverage51)?,
            coverage_50_adjusted: new_gauge(&registry, GaugeId::Coverage50Adjusted)?,
            coverage_51_adjusted: new_gauge(&registry, GaugeId::Coverage51Adjusted)?,
            peak_height: new_gauge(&registry, GaugeId::PeakHeight)?,
            registry,
        })
    }

    /// Text exposition of the registry, for the /metrics endpoint.
    pub fn encode(&self) -> Result<String> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| Error::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| Error::Metrics(e.to_string()))
    }
}

impl MetricsSink for PrometheusSink {
    fn set_gauge(&self, gauge: GaugeId, value: f64) {
        match gauge {
            GaugeId::Coverage50 => self.coverage_50.set(value),
            GaugeId::Coverage51 => self.coverage_51.set(value),
            GaugeId::Coverage50Adjusted => self.coverage_50_adjusted.set(value),
            GaugeId::Coverage51Adjusted => self.coverage_51_adjusted.set(value),
            GaugeId::PeakHeight => self.peak_height.set(value),
        }
    }
}
