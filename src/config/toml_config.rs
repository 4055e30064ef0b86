use crate::adapters::{
    GooglePlacesAdapter, GooglePlacesOptions, HttpFetcher, OpenChargeMapAdapter,
    OpenChargeMapOptions, OutputFormat, RetryPolicy, SinkOptions,
};
use crate::core::{Cleaner, CleanerOptions, EtlEngine, GeoMatcher, MatcherOptions, OutOfBoundsPolicy};
use crate::domain::model::{BoundingBox, Source};
use crate::domain::ports::{PointSink, SourceAdapter};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub bounding_box: Option<BoundingBox>,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub enabled: Vec<String>,
    pub google_places: Option<GooglePlacesConfig>,
    pub open_charge_map: Option<OpenChargeMapConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GooglePlacesConfig {
    pub api_key: String,
    pub nearby_url: Option<String>,
    pub details_url: Option<String>,
    pub keyword: Option<String>,
    pub search_radius_m: Option<u32>,
    pub grid_step_deg: Option<f64>,
    pub page_token_delay_ms: Option<u64>,
    pub max_pages: Option<u32>,
    pub fetch_details: Option<bool>,
}

impl GooglePlacesConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            nearby_url: None,
            details_url: None,
            keyword: None,
            search_radius_m: None,
            grid_step_deg: None,
            page_token_delay_ms: None,
            max_pages: None,
            fetch_details: None,
        }
    }

    pub fn to_options(&self) -> GooglePlacesOptions {
        let mut options = GooglePlacesOptions::new(self.api_key.clone());
        if let Some(url) = &self.nearby_url {
            options.nearby_url = url.clone();
        }
        if let Some(url) = &self.details_url {
            options.details_url = url.clone();
        }
        if let Some(keyword) = &self.keyword {
            options.keyword = keyword.clone();
        }
        if let Some(radius) = self.search_radius_m {
            options.search_radius_m = radius;
        }
        if let Some(step) = self.grid_step_deg {
            options.grid_step_deg = step;
        }
        if let Some(delay) = self.page_token_delay_ms {
            options.page_token_delay = Duration::from_millis(delay);
        }
        if let Some(pages) = self.max_pages {
            options.max_pages = pages;
        }
        if let Some(details) = self.fetch_details {
            options.fetch_details = details;
        }
        options
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenChargeMapConfig {
    pub api_key: String,
    pub endpoint: Option<String>,
    pub country_code: Option<String>,
    pub max_results: Option<u32>,
    pub grid_step_deg: Option<f64>,
}

impl OpenChargeMapConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: None,
            country_code: None,
            max_results: None,
            grid_step_deg: None,
        }
    }

    pub fn to_options(&self) -> OpenChargeMapOptions {
        let mut options = OpenChargeMapOptions::new(self.api_key.clone());
        if let Some(endpoint) = &self.endpoint {
            options.endpoint = endpoint.clone();
        }
        if let Some(code) = &self.country_code {
            options.country_code = code.clone();
        }
        if let Some(max) = self.max_results {
            options.max_results = max;
        }
        if let Some(step) = self.grid_step_deg {
            options.grid_step_deg = step;
        }
        options
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    /// Upper bound for one source's whole fetch, pagination included.
    pub source_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub radius_m: Option<f64>,
    pub min_name_similarity: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// "exclude" or "flag"
    pub out_of_bounds: Option<String>,
    pub coordinate_precision: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
    pub file_prefix: Option<String>,
    pub write_report: Option<bool>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Config with defaults everywhere and only the given sources configured.
    pub fn with_sources(
        google_places: Option<GooglePlacesConfig>,
        open_charge_map: Option<OpenChargeMapConfig>,
        output_path: impl Into<String>,
    ) -> Self {
        let mut enabled = Vec::new();
        if google_places.is_some() {
            enabled.push(Source::GooglePlaces.to_string());
        }
        if open_charge_map.is_some() {
            enabled.push(Source::OpenChargeMap.to_string());
        }
        Self {
            pipeline: PipelineConfig::default(),
            bounding_box: None,
            sources: SourcesConfig {
                enabled,
                google_places,
                open_charge_map,
            },
            http: HttpConfig::default(),
            matching: MatchingConfig::default(),
            cleaning: CleaningConfig::default(),
            load: LoadConfig {
                output_path: output_path.into(),
                output_formats: vec!["csv".to_string()],
                file_prefix: None,
                write_report: None,
                compression: None,
            },
        }
    }

    /// 替換環境變數 (例如 ${API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        // 使用正規表達式匹配 ${VAR_NAME} 格式
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box.unwrap_or_else(BoundingBox::central_london)
    }

    pub fn enabled_sources(&self) -> Result<BTreeSet<Source>> {
        self.sources
            .enabled
            .iter()
            .map(|name| {
                name.parse::<Source>()
                    .map_err(|reason| EtlError::InvalidConfigValueError {
                        field: "sources.enabled".to_string(),
                        value: name.clone(),
                        reason,
                    })
            })
            .collect()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_bounding_box(&self.bounding_box())?;

        let enabled = self.enabled_sources()?;
        if enabled.is_empty() {
            return Err(EtlError::NoSourcesEnabled);
        }
        self.validate_sources(&enabled)?;

        if let Some(timeout) = self.http.timeout_seconds {
            validation::validate_range("http.timeout_seconds", timeout, 1, 600)?;
        }
        if let Some(attempts) = self.http.retry_attempts {
            validation::validate_range("http.retry_attempts", attempts, 1, 10)?;
        }
        if let Some(radius) = self.matching.radius_m {
            validation::validate_range("matching.radius_m", radius, 1.0, 1000.0)?;
        }
        if let Some(similarity) = self.matching.min_name_similarity {
            validation::validate_range("matching.min_name_similarity", similarity, 0.0, 1.0)?;
        }
        self.cleaner_options()?;
        if let Some(precision) = self.cleaning.coordinate_precision {
            validation::validate_range("cleaning.coordinate_precision", precision, 1, 8)?;
        }

        // 驗證輸出
        validation::validate_path("load.output_path", &self.load.output_path)?;
        self.sink_options()?;

        Ok(())
    }

    /// Every enabled source must have a section with a usable key.
    pub fn validate_sources(&self, enabled: &BTreeSet<Source>) -> Result<()> {
        for source in enabled {
            match source {
                Source::GooglePlaces => {
                    let section = self.sources.google_places.as_ref().ok_or_else(|| {
                        EtlError::MissingConfigError {
                            field: "sources.google_places".to_string(),
                        }
                    })?;
                    validation::validate_api_key("sources.google_places.api_key", &section.api_key)?;
                    let options = section.to_options();
                    validation::validate_url("sources.google_places.nearby_url", &options.nearby_url)?;
                    validation::validate_url(
                        "sources.google_places.details_url",
                        &options.details_url,
                    )?;
                    validation::validate_positive_number(
                        "sources.google_places.max_pages",
                        options.max_pages as usize,
                        1,
                    )?;
                    validation::validate_range(
                        "sources.google_places.grid_step_deg",
                        options.grid_step_deg,
                        1e-4,
                        10.0,
                    )?;
                }
                Source::OpenChargeMap => {
                    let section = self.sources.open_charge_map.as_ref().ok_or_else(|| {
                        EtlError::MissingConfigError {
                            field: "sources.open_charge_map".to_string(),
                        }
                    })?;
                    validation::validate_api_key(
                        "sources.open_charge_map.api_key",
                        &section.api_key,
                    )?;
                    let options = section.to_options();
                    validation::validate_url("sources.open_charge_map.endpoint", &options.endpoint)?;
                    validation::validate_positive_number(
                        "sources.open_charge_map.max_results",
                        options.max_results as usize,
                        1,
                    )?;
                    validation::validate_range(
                        "sources.open_charge_map.grid_step_deg",
                        options.grid_step_deg,
                        1e-4,
                        10.0,
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds.unwrap_or(30))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.http.source_timeout_seconds.unwrap_or(300))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy::new(
            self.http.retry_attempts.unwrap_or(defaults.attempts),
            self.http
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        )
    }

    pub fn matcher_options(&self) -> MatcherOptions {
        let defaults = MatcherOptions::default();
        MatcherOptions {
            radius_m: self.matching.radius_m.unwrap_or(defaults.radius_m),
            min_name_similarity: self
                .matching
                .min_name_similarity
                .unwrap_or(defaults.min_name_similarity),
        }
    }

    pub fn cleaner_options(&self) -> Result<CleanerOptions> {
        let defaults = CleanerOptions::default();
        let out_of_bounds = match &self.cleaning.out_of_bounds {
            Some(value) => {
                OutOfBoundsPolicy::parse(value).ok_or_else(|| EtlError::InvalidConfigValueError {
                    field: "cleaning.out_of_bounds".to_string(),
                    value: value.clone(),
                    reason: "expected 'exclude' or 'flag'".to_string(),
                })?
            }
            None => defaults.out_of_bounds,
        };
        Ok(CleanerOptions {
            out_of_bounds,
            coordinate_precision: self
                .cleaning
                .coordinate_precision
                .unwrap_or(defaults.coordinate_precision),
        })
    }

    pub fn sink_options(&self) -> Result<SinkOptions> {
        let defaults = SinkOptions::default();
        let mut formats = Vec::new();
        for format in &self.load.output_formats {
            let parsed =
                OutputFormat::parse(format).ok_or_else(|| EtlError::InvalidConfigValueError {
                    field: "load.output_formats".to_string(),
                    value: format.clone(),
                    reason: "Unsupported format. Valid formats: csv, json".to_string(),
                })?;
            if !formats.contains(&parsed) {
                formats.push(parsed);
            }
        }
        if formats.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "load.output_formats".to_string(),
            });
        }

        Ok(SinkOptions {
            file_prefix: self.load.file_prefix.clone().unwrap_or(defaults.file_prefix),
            formats,
            archive_name: self
                .load
                .compression
                .as_ref()
                .filter(|c| c.enabled)
                .map(|c| c.filename.clone()),
            write_report: self.load.write_report.unwrap_or(defaults.write_report),
        })
    }

    /// Adapters for every configured source section.
    pub fn build_adapters(&self) -> Result<Vec<Arc<dyn SourceAdapter>>> {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        if let Some(section) = &self.sources.google_places {
            let http = HttpFetcher::new(
                Source::GooglePlaces,
                self.request_timeout(),
                self.retry_policy(),
            )?;
            adapters.push(Arc::new(GooglePlacesAdapter::new(section.to_options(), http)));
        }
        if let Some(section) = &self.sources.open_charge_map {
            let http = HttpFetcher::new(
                Source::OpenChargeMap,
                self.request_timeout(),
                self.retry_policy(),
            )?;
            adapters.push(Arc::new(OpenChargeMapAdapter::new(section.to_options(), http)));
        }
        Ok(adapters)
    }

    pub fn build_engine(&self, sink: Arc<dyn PointSink>) -> Result<EtlEngine> {
        Ok(EtlEngine::new(
            self.build_adapters()?,
            GeoMatcher::new(self.matcher_options()),
            Cleaner::new(self.cleaner_options()?),
            sink,
        )
        .with_source_timeout(self.source_timeout()))
    }

    /// 取得輸出路徑
    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
