use crate::config::toml_config::{GooglePlacesConfig, OpenChargeMapConfig, TomlConfig};
use crate::domain::model::Source;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_api_key, validate_non_empty_string, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

#[cfg(feature = "lambda")]
use crate::domain::ports::Storage;
#[cfg(feature = "lambda")]
use aws_sdk_s3::Client as S3Client;

/// Which sources a serverless invocation pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVariant {
    #[default]
    Both,
    OcmOnly,
}

impl RunVariant {
    pub fn sources(&self) -> BTreeSet<Source> {
        match self {
            RunVariant::Both => BTreeSet::from(Source::ALL),
            RunVariant::OcmOnly => BTreeSet::from([Source::OpenChargeMap]),
        }
    }
}

impl FromStr for RunVariant {
    type Err = EtlError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "both" => Ok(RunVariant::Both),
            "ocm_only" | "ocm" => Ok(RunVariant::OcmOnly),
            other => Err(EtlError::InvalidConfigValueError {
                field: "EV_ETL_VARIANT".to_string(),
                value: other.to_string(),
                reason: "expected 'both' or 'ocm_only'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub variant: RunVariant,
    pub google_api_key: Option<String>,
    pub ocm_api_key: String,
    pub s3_bucket: String,
    pub s3_prefix: String,
    pub s3_region: String,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup` so tests need not touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let variant = match lookup("EV_ETL_VARIANT") {
            Some(value) => value.parse()?,
            None => RunVariant::default(),
        };

        Ok(Self {
            variant,
            google_api_key: lookup("GOOGLE_PLACES_API_KEY").filter(|k| !k.trim().is_empty()),
            ocm_api_key: lookup("OCM_API_KEY").ok_or_else(|| EtlError::MissingConfigError {
                field: "OCM_API_KEY".to_string(),
            })?,
            s3_bucket: lookup("S3_BUCKET").ok_or_else(|| EtlError::ConfigError {
                message: "S3_BUCKET environment variable is required".to_string(),
            })?,
            s3_prefix: lookup("S3_PREFIX").unwrap_or_else(|| "ev-chargers".to_string()),
            s3_region: lookup("S3_REGION").unwrap_or_else(|| "eu-west-2".to_string()),
        })
    }

    /// Pipeline settings for this invocation; the S3 prefix doubles as output path.
    pub fn to_etl_config(&self, variant: RunVariant) -> TomlConfig {
        let google = match variant {
            RunVariant::Both => self.google_api_key.clone().map(GooglePlacesConfig::new),
            RunVariant::OcmOnly => None,
        };
        let mut config = TomlConfig::with_sources(
            google,
            Some(OpenChargeMapConfig::new(self.ocm_api_key.clone())),
            self.s3_prefix.clone(),
        );
        config.sources.enabled = variant.sources().iter().map(Source::to_string).collect();
        config
    }
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        validate_api_key("OCM_API_KEY", &self.ocm_api_key)?;
        if self.variant == RunVariant::Both {
            match &self.google_api_key {
                Some(key) => validate_api_key("GOOGLE_PLACES_API_KEY", key)?,
                None => {
                    return Err(EtlError::MissingConfigError {
                        field: "GOOGLE_PLACES_API_KEY".to_string(),
                    })
                }
            }
        }
        validate_s3_bucket_name("s3_bucket", &self.s3_bucket)?;
        validate_non_empty_string("s3_prefix", &self.s3_prefix)?;
        validate_aws_region("s3_region", &self.s3_region)?;

        tracing::info!("✅ Lambda configuration validation passed");
        Ok(())
    }
}

fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name must be between 3 and 63 characters".to_string(),
        });
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots"
                .to_string(),
        });
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name cannot start or end with a hyphen".to_string(),
        });
    }

    Ok(())
}

fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        });
    }

    Ok(())
}

#[cfg(feature = "lambda")]
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    prefix: String,
}

#[cfg(feature = "lambda")]
impl S3Storage {
    pub fn new(client: S3Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    fn key(&self, path: &str) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", prefix, path)
        }
    }
}

#[cfg(feature = "lambda")]
impl Storage for S3Storage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| EtlError::SinkWriteFailure {
                path: self.describe(path),
                message: format!("{}", aws_sdk_s3::error::DisplayErrorContext(e)),
            })?;
        Ok(())
    }

    fn describe(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(path))
    }
}
