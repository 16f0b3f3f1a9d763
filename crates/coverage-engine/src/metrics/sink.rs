use std::collections::BTreeMap;
use std::sync::RwLock;

/// The five gauges this engine publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GaugeId {
    Coverage50,
    Coverage51,
    Coverage50Adjusted,
    Coverage51Adjusted,
    PeakHeight,
}

impl GaugeId {
    pub fn name(&self) -> &'static str {
        match self {
            GaugeId::Coverage50 => "coverage_coefficient_gt50",
            GaugeId::Coverage51 => "coverage_coefficient_gt51",
            GaugeId::Coverage50Adjusted => "coverage_coefficient_gt50_adjusted",
            GaugeId::Coverage51Adjusted => "coverage_coefficient_gt51_adjusted",
            GaugeId::PeakHeight => "peak_height",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            GaugeId::Coverage50 => "Coverage coefficient at the 50% threshold",
            GaugeId::Coverage51 => "Coverage coefficient at the 51% threshold",
            GaugeId::Coverage50Adjusted => {
                "Coverage coefficient at the 50% threshold with excluded producers removed"
            }
            GaugeId::Coverage51Adjusted => {
                "Coverage coefficient at the 51% threshold with excluded producers removed"
            }
            GaugeId::PeakHeight => "Peak height the current gauges were computed at",
        }
    }
}

/// Write-only fan-out for gauge publication. No read path is needed by the
/// engine; exposition belongs to the caller.
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, gauge: GaugeId, value: f64);
}

/// Sink for tests: remembers the last value per gauge.
#[derive(Default)]
pub struct MemorySink {
    values: RwLock<BTreeMap<GaugeId, f64>>,
}

impl MemorySink {
    pub fn get(&self, gauge: GaugeId) -> Option<f64> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&gauge).copied()
    }
}

impl MetricsSink for MemorySink {
    fn set_gauge(&self, gauge: GaugeId, value: f64) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(gauge, value);
    }
}
