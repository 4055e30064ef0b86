use crate::domain::model::{ChargingSpeed, CleanedPoint};
use crate::domain::ports::{PointSink, Storage};
use crate::domain::report::RunReport;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const REPORT_FILENAME: &str = "run_report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub file_prefix: String,
    pub formats: Vec<OutputFormat>,
    /// Pack every output into one ZIP archive with this name.
    pub archive_name: Option<String>,
    pub write_report: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            file_prefix: "ev_chargers".to_string(),
            formats: vec![OutputFormat::Csv],
            archive_name: None,
            write_report: true,
        }
    }
}

/// One flat CSV row per cleaned point.
#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    google_id: Option<&'a str>,
    ocm_id: Option<&'a str>,
    name: &'a str,
    latitude: f64,
    longitude: f64,
    address: Option<&'a str>,
    status: Option<&'a str>,
    phone: Option<&'a str>,
    rating: Option<f64>,
    operator: Option<&'a str>,
    usage_type: Option<&'a str>,
    connector_types: String,
    connector_powers_kw: String,
    number_of_connectors: usize,
    total_connector_quantity: usize,
    min_power_kw: Option<f64>,
    max_power_kw: Option<f64>,
    max_charging_speed: Option<ChargingSpeed>,
    rapid_available: bool,
    fast_available: bool,
    slow_available: bool,
    amenity_tags: String,
    match_confidence: Option<f64>,
    sources: String,
    provenance: String,
    in_bounding_box: bool,
    dedup_group: Option<&'a str>,
    absorbed_ids: String,
}

impl<'a> From<&'a CleanedPoint> for OutputRow<'a> {
    fn from(cleaned: &'a CleanedPoint) -> Self {
        let p = &cleaned.point;
        OutputRow {
            google_id: p.google_id.as_deref(),
            ocm_id: p.ocm_id.as_deref(),
            name: &p.name,
            latitude: p.latitude,
            longitude: p.longitude,
            address: p.address.as_deref(),
            status: p.status.as_deref(),
            phone: p.phone.as_deref(),
            rating: p.rating,
            operator: p.operator.as_deref(),
            usage_type: p.usage_type.as_deref(),
            connector_types: p
                .connectors
                .iter()
                .map(|c| c.connection_type.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            connector_powers_kw: p
                .connectors
                .iter()
                .map(|c| match c.power_kw {
                    Some(kw) => format!("{:.1}", kw),
                    None => String::new(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            number_of_connectors: cleaned.charging.number_of_connectors,
            total_connector_quantity: cleaned.charging.total_connector_quantity,
            min_power_kw: cleaned.charging.min_power_kw,
            max_power_kw: cleaned.charging.max_power_kw,
            max_charging_speed: cleaned.charging.max_charging_speed,
            rapid_available: cleaned.charging.rapid_available,
            fast_available: cleaned.charging.fast_available,
            slow_available: cleaned.charging.slow_available,
            amenity_tags: p.amenity_tags.join("; "),
            match_confidence: p.match_confidence,
            sources: p
                .sources()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            provenance: p
                .provenance
                .iter()
                .map(|(field, source)| {
                    format!(
                        "{}={}",
                        serde_json::to_value(field)
                            .ok()
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default(),
                        source
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
            in_bounding_box: cleaned.in_bounding_box,
            dedup_group: cleaned.dedup_group.as_deref(),
            absorbed_ids: p.absorbed_ids.join("; "),
        }
    }
}

pub fn render_csv(points: &[CleanedPoint]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for point in points {
        writer.serialize(OutputRow::from(point))?;
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| EtlError::IoError(e.into_error()))
}

/// Writes the dataset through a [`Storage`] backend.
pub struct FileSink<S: Storage> {
    storage: S,
    options: SinkOptions,
}

impl<S: Storage> FileSink<S> {
    pub fn new(storage: S, options: SinkOptions) -> Self {
        Self { storage, options }
    }

    fn render(&self, points: &[CleanedPoint], report: &RunReport) -> Result<Vec<(String, Vec<u8>)>> {
        let stamp = report.started_at.format("%Y-%m-%d");
        let mut files = Vec::new();

        for format in &self.options.formats {
            let name = format!("{}_{}.{}", self.options.file_prefix, stamp, format.extension());
            let data = match format {
                OutputFormat::Csv => render_csv(points)?,
                OutputFormat::Json => serde_json::to_vec_pretty(points)?,
            };
            files.push((name, data));
        }

        if self.options.write_report {
            files.push((REPORT_FILENAME.to_string(), serde_json::to_vec_pretty(report)?));
        }
        Ok(files)
    }

    async fn store(&self, name: &str, data: &[u8]) -> Result<String> {
        let location = self.storage.describe(name);
        tracing::debug!("Writing {} bytes to {}", data.len(), location);
        self.storage
            .write_file(name, data)
            .await
            .map_err(|e| EtlError::SinkWriteFailure {
                path: location.clone(),
                message: e.to_string(),
            })?;
        Ok(location)
    }
}

fn build_archive(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(data)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[async_trait]
impl<S: Storage> PointSink for FileSink<S> {
    async fn write(&self, points: &[CleanedPoint], report: &RunReport) -> Result<String> {
        let files = self.render(points, report)?;

        if let Some(archive_name) = &self.options.archive_name {
            tracing::debug!("Creating ZIP archive with {} files", files.len());
            let archive = build_archive(&files)?;
            return self.store(archive_name, &archive).await;
        }

        let mut primary = None;
        for (name, data) in &files {
            let location = self.store(name, data).await?;
            if primary.is_none() {
                primary = Some(location);
            }
        }
        primary.ok_or_else(|| EtlError::ConfigError {
            message: "no output formats configured".to_string(),
        })
    }
}
