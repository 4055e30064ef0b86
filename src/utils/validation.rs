use crate::domain::model::{BoundingBox, LATITUDE_RANGE, LONGITUDE_RANGE};
use crate::utils::error::{EtlError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(EtlError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// Rejects blank values and `${VAR}` placeholders left unresolved by env substitution.
pub fn validate_api_key(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::MissingConfigError {
            field: field_name.to_string(),
        });
    }
    if value.starts_with("${") && value.ends_with('}') {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "environment variable is not set".to_string(),
        });
    }
    Ok(())
}

/// Unordered values such as NaN fail the check.
pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if !(value >= min && value <= max) {
        return Err(EtlError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_bounding_box(bbox: &BoundingBox) -> Result<()> {
    let corners = [bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon];
    if corners.iter().any(|v| !v.is_finite()) {
        return Err(EtlError::InvalidBoundingBox {
            reason: "coordinates must be finite numbers".to_string(),
        });
    }
    for (name, value, (min, max)) in [
        ("min_lat", bbox.min_lat, LATITUDE_RANGE),
        ("max_lat", bbox.max_lat, LATITUDE_RANGE),
        ("min_lon", bbox.min_lon, LONGITUDE_RANGE),
        ("max_lon", bbox.max_lon, LONGITUDE_RANGE),
    ] {
        if value < min || value > max {
            return Err(EtlError::InvalidBoundingBox {
                reason: format!("{} {} is outside [{}, {}]", name, value, min, max),
            });
        }
    }
    if bbox.min_lat >= bbox.max_lat {
        return Err(EtlError::InvalidBoundingBox {
            reason: format!("min_lat {} must be below max_lat {}", bbox.min_lat, bbox.max_lat),
        });
    }
    if bbox.min_lon >= bbox.max_lon {
        return Err(EtlError::InvalidBoundingBox {
            reason: format!("min_lon {} must be below max_lon {}", bbox.min_lon, bbox.max_lon),
        });
    }
    Ok(())
}
