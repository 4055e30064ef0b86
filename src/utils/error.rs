use crate::domain::model::Source;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid bounding box: {reason}")]
    InvalidBoundingBox { reason: String },

    #[error("No data sources enabled for this run")]
    NoSourcesEnabled,

    #[error("Source {data_source} unavailable: {reason}")]
    SourceUnavailable { data_source: Source, reason: String },

    #[error("All enabled sources were unavailable")]
    AllSourcesUnavailable,

    #[error("Failed to write output to '{path}': {message}")]
    SinkWriteFailure { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Source,
    Data,
    Sink,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidBoundingBox { .. }
            | EtlError::NoSourcesEnabled => ErrorCategory::Configuration,
            EtlError::ApiError(_)
            | EtlError::SourceUnavailable { .. }
            | EtlError::AllSourcesUnavailable => ErrorCategory::Source,
            EtlError::CsvError(_) | EtlError::SerializationError(_) => ErrorCategory::Data,
            EtlError::SinkWriteFailure { .. } | EtlError::ZipError(_) => ErrorCategory::Sink,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::ApiError(_)
            | EtlError::SourceUnavailable { .. }
            | EtlError::AllSourcesUnavailable => ErrorSeverity::Medium,
            EtlError::SinkWriteFailure { .. } | EtlError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Sink failures happen after the data was computed: a retry should not re-fetch.
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, EtlError::SinkWriteFailure { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => {
                "Check the configuration file for typos and unsupported values".to_string()
            }
            EtlError::MissingConfigError { field } => {
                format!("Provide '{}' in the configuration file or environment", field)
            }
            EtlError::InvalidBoundingBox { .. } => {
                "Use finite coordinates with min < max for both latitude and longitude".to_string()
            }
            EtlError::NoSourcesEnabled => {
                "Enable at least one of google_places, open_charge_map".to_string()
            }
            EtlError::SourceUnavailable { data_source, .. } => format!(
                "Check the {} API key, quota and network connectivity",
                data_source
            ),
            EtlError::AllSourcesUnavailable | EtlError::ApiError(_) => {
                "Check network connectivity and API keys, then retry the run".to_string()
            }
            EtlError::SinkWriteFailure { .. } | EtlError::ZipError(_) => {
                "Check permissions and free space at the output location, then retry the write"
                    .to_string()
            }
            EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                "Inspect the offending records in the debug log".to_string()
            }
            EtlError::IoError(_) => "Check file permissions and available disk space".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Source => format!("Data source problem: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::Sink => format!("Could not save the output: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
