use crate::domain::model::{ExclusionReason, MalformedReason, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-run counts; written next to the dataset and emitted as structured log fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub enabled_sources: BTreeSet<Source>,
    pub fetched: BTreeMap<Source, usize>,
    pub unavailable: BTreeMap<Source, String>,
    pub malformed: BTreeMap<Source, BTreeMap<MalformedReason, usize>>,
    pub matched_pairs: usize,
    pub merged_points: usize,
    pub excluded: BTreeMap<ExclusionReason, usize>,
    pub output_rows: usize,
    pub output_path: Option<String>,
}

impl RunReport {
    pub fn new(run_id: String, enabled_sources: BTreeSet<Source>) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            enabled_sources,
            fetched: BTreeMap::new(),
            unavailable: BTreeMap::new(),
            malformed: BTreeMap::new(),
            matched_pairs: 0,
            merged_points: 0,
            excluded: BTreeMap::new(),
            output_rows: 0,
            output_path: None,
        }
    }

    pub fn record_malformed(&mut self, source: Source, reason: MalformedReason) {
        *self
            .malformed
            .entry(source)
            .or_default()
            .entry(reason)
            .or_insert(0) += 1;
    }

    pub fn record_exclusion(&mut self, reason: ExclusionReason) {
        *self.excluded.entry(reason).or_insert(0) += 1;
    }

    pub fn fetched_from(&self, source: Source) -> usize {
        self.fetched.get(&source).copied().unwrap_or(0)
    }

    pub fn excluded_for(&self, reason: ExclusionReason) -> usize {
        self.excluded.get(&reason).copied().unwrap_or(0)
    }

    pub fn malformed_total(&self, source: Source) -> usize {
        self.malformed
            .get(&source)
            .map(|by_reason| by_reason.values().sum())
            .unwrap_or(0)
    }

    /// Completed with fewer sources than were enabled.
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            google_fetched = self.fetched_from(Source::GooglePlaces),
            ocm_fetched = self.fetched_from(Source::OpenChargeMap),
            google_malformed = self.malformed_total(Source::GooglePlaces),
            ocm_malformed = self.malformed_total(Source::OpenChargeMap),
            matched_pairs = self.matched_pairs,
            merged_points = self.merged_points,
            missing_coordinates = self.excluded_for(ExclusionReason::MissingCoordinates),
            invalid_coordinates = self.excluded_for(ExclusionReason::InvalidCoordinates),
            out_of_bounds = self.excluded_for(ExclusionReason::OutOfBounds),
            duplicates = self.excluded_for(ExclusionReason::Duplicate),
            output_rows = self.output_rows,
            degraded = self.is_degraded(),
            "📊 Run report"
        );
        for (source, reason) in &self.unavailable {
            tracing::warn!(source = %source, reason = %reason, "Source unavailable during run");
        }
    }
}
