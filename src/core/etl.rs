use crate::core::cleaner::Cleaner;
use crate::core::matcher::GeoMatcher;
use crate::domain::model::{BoundingBox, CleanedPoint, NormalizedPoint, Source, SourceBatch};
use crate::domain::ports::{PointSink, SourceAdapter};
use crate::domain::report::RunReport;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::validate_bounding_box;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub points: Vec<CleanedPoint>,
    pub report: RunReport,
    pub output_path: String,
}

/// Fetch -> match -> clean -> write.
pub struct EtlEngine {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    matcher: GeoMatcher,
    cleaner: Cleaner,
    sink: Arc<dyn PointSink>,
    source_timeout: Duration,
}

impl EtlEngine {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        matcher: GeoMatcher,
        cleaner: Cleaner,
        sink: Arc<dyn PointSink>,
    ) -> Self {
        Self {
            adapters,
            matcher,
            cleaner,
            sink,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Checks everything that must hold before any API call and returns the
    /// adapters that will be used.
    pub fn plan(
        &self,
        bbox: &BoundingBox,
        enabled: &BTreeSet<Source>,
    ) -> Result<Vec<Arc<dyn SourceAdapter>>> {
        validate_bounding_box(bbox)?;
        if enabled.is_empty() {
            return Err(EtlError::NoSourcesEnabled);
        }

        enabled
            .iter()
            .map(|source| {
                self.adapters
                    .iter()
                    .find(|adapter| adapter.source() == *source)
                    .cloned()
                    .ok_or_else(|| EtlError::MissingConfigError {
                        field: format!("sources.{}", source),
                    })
            })
            .collect()
    }

    pub async fn run(&self, bbox: &BoundingBox, enabled: &BTreeSet<Source>) -> Result<RunOutput> {
        let adapters = self.plan(bbox, enabled)?;
        let run_id = format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
        let mut report = RunReport::new(run_id, enabled.clone());

        tracing::info!(
            "🚀 Starting run {} over {:?} with sources {:?}",
            report.run_id,
            bbox,
            enabled.iter().map(Source::as_str).collect::<Vec<_>>()
        );

        // Extract
        let results = join_all(adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let bbox = *bbox;
            let timeout = self.source_timeout;
            async move {
                let source = adapter.source();
                let outcome = match tokio::time::timeout(timeout, adapter.fetch(&bbox)).await {
                    Ok(result) => result,
                    Err(_) => Err(EtlError::SourceUnavailable {
                        data_source: source,
                        reason: format!("timed out after {}s", timeout.as_secs()),
                    }),
                };
                (source, outcome)
            }
        }))
        .await;

        let mut google = Vec::new();
        let mut ocm = Vec::new();
        for (source, outcome) in results {
            match outcome {
                Ok(batch) => {
                    let SourceBatch { points, malformed } = batch;
                    tracing::info!(
                        "📥 {} returned {} points ({} malformed)",
                        source,
                        points.len(),
                        malformed.len()
                    );
                    report.fetched.insert(source, points.len());
                    for record in &malformed {
                        tracing::debug!(
                            "Dropped {} record {}: {}",
                            record.source,
                            record.external_id,
                            record.reason
                        );
                        report.record_malformed(source, record.reason);
                    }
                    match source {
                        Source::GooglePlaces => google = points,
                        Source::OpenChargeMap => ocm = points,
                    }
                }
                Err(e) => {
                    tracing::warn!("⚠️ {} unavailable: {}", source, e);
                    report.unavailable.insert(source, unavailable_reason(e));
                }
            }
        }

        if report.unavailable.len() == enabled.len() {
            tracing::error!("❌ Every enabled source is unavailable, nothing will be written");
            return Err(EtlError::AllSourcesUnavailable);
        }

        // Transform
        let points = self.transform(google, ocm, bbox, &mut report);

        // Load
        report.output_rows = points.len();
        report.finished_at = Some(Utc::now());
        let output_path = self.sink.write(&points, &report).await?;
        report.output_path = Some(output_path.clone());

        tracing::info!("✅ Wrote {} rows to {}", points.len(), output_path);
        report.log_summary();

        Ok(RunOutput {
            points,
            report,
            output_path,
        })
    }

    fn transform(
        &self,
        google: Vec<NormalizedPoint>,
        ocm: Vec<NormalizedPoint>,
        bbox: &BoundingBox,
        report: &mut RunReport,
    ) -> Vec<CleanedPoint> {
        let matched = self.matcher.match_points(google, ocm);
        report.matched_pairs = matched.matched_pairs;
        report.merged_points = matched.merged.len();
        tracing::info!(
            "🔗 Matched {} pairs into {} merged points",
            matched.matched_pairs,
            matched.merged.len()
        );

        let cleaned = self.cleaner.clean(matched.merged, bbox);
        for exclusion in &cleaned.exclusions {
            report.record_exclusion(exclusion.reason);
        }
        tracing::info!(
            "🧹 Cleaned to {} rows, {} excluded",
            cleaned.points.len(),
            cleaned.exclusions.len()
        );
        cleaned.points
    }
}

fn unavailable_reason(error: EtlError) -> String {
    match error {
        EtlError::SourceUnavailable { reason, .. } => reason,
        other => other.to_string(),
    }
}
