// src/warehouse/report.rs

use std::collections::BTreeMap;
use tracing::{info, warn};

use super::dimension::DimensionStats;
use super::fact::FactOutcome;

/// What one load run did, dimension by dimension.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub rows: usize,
    /// In load order.
    pub dimensions: Vec<(&'static str, DimensionStats)>,
    pub facts_written: usize,
    pub facts_skipped: usize,
    /// Skipped-fact counts by [`SkipReason::label`](super::fact::SkipReason::label).
    pub skip_reasons: BTreeMap<String, usize>,
    /// Set when the run stopped early.
    pub failed_at: Option<String>,
}

impl LoadReport {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn record_dimension(&mut self, name: &'static str, stats: DimensionStats) {
        self.dimensions.push((name, stats));
    }

    pub fn record_facts(&mut self, outcome: &FactOutcome) {
        self.facts_written = outcome.written;
        self.facts_skipped = outcome.skipped.len();
        self.skip_reasons.clear();
        for skip in &outcome.skipped {
            *self.skip_reasons.entry(skip.reason.label()).or_insert(0) += 1;
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionStats> {
        self.dimensions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| s)
    }

    pub fn log(&self) {
        info!(rows = self.rows, "load report");
        for (name, s) in &self.dimensions {
            info!(
                dimension = name,
                seeded = s.seeded,
                distinct = s.distinct,
                inserted = s.inserted,
                recovered = s.recovered,
                missed = s.missed,
                failed = s.failed,
                incomplete_rows = s.incomplete_rows,
                "dimension"
            );
        }
        info!(written = self.facts_written, skipped = self.facts_skipped, "facts");
        for (reason, count) in &self.skip_reasons {
            warn!(count, "skipped: {}", reason);
        }
        if let Some(stage) = &self.failed_at {
            warn!("load stopped during {}", stage);
        }
    }
}
