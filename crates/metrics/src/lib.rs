use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Counters for one tracker process, exported in the Prometheus text format.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    classifications: IntCounterVec,
    migrated_records: IntCounter,
    skipped_observations: IntCounter,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let classifications = IntCounterVec::new(
            Opts::new(
                "pricehist_classifications_total",
                "Observations classified, by outcome",
            ),
            &["kind"],
        )?;
        let migrated_records = IntCounter::new(
            "pricehist_migrated_records_total",
            "Stored values rewritten by schema migration",
        )?;
        let skipped_observations = IntCounter::new(
            "pricehist_skipped_observations_total",
            "Observations rejected before classification",
        )?;
        registry.register(Box::new(classifications.clone()))?;
        registry.register(Box::new(migrated_records.clone()))?;
        registry.register(Box::new(skipped_observations.clone()))?;
        Ok(Self {
            registry,
            classifications,
            migrated_records,
            skipped_observations,
        })
    }

    pub fn record_classification(&self, kind: &str) {
        self.classifications.with_label_values(&[kind]).inc();
    }

    pub fn record_migrated(&self, count: usize) {
        self.migrated_records.inc_by(count as u64);
    }

    pub fn record_skipped(&self) {
        self.skipped_observations.inc();
    }

    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        debug!(families = metric_families.len(), "metrics rendered");
        Ok(String::from_utf8(buffer)?)
    }
}
