use crate::adapters::http::HttpFetcher;
use crate::domain::model::{
    BoundingBox, MalformedReason, MalformedRecord, NormalizedPoint, Source, SourceBatch,
};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_NEARBY_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
pub const DEFAULT_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

const DETAILS_FIELDS: &str =
    "name,formatted_address,geometry,types,business_status,formatted_phone_number,rating";

/// Place types Google assigns to charging stations.
const CHARGER_TYPES: [&str; 2] = ["electric_vehicle_charging_station", "charging_station"];

/// Keywords of three characters or fewer must match a whole word of the name.
const CHARGER_KEYWORDS: [&str; 26] = [
    "charge",
    "charging",
    "ev",
    "ev-charger",
    "ev charger",
    "pod point",
    "pod-point",
    "podpoint",
    "bp pulse",
    "bp-pulse",
    "tesla",
    "supercharger",
    "instavolt",
    "chargepoint",
    "rapid charger",
    "rapid charge",
    "ac charger",
    "dc charger",
    "shell recharge",
    "shell-recharge",
    "ionity",
    "evgo",
    "engie",
    "mer",
    "octopus",
    "octopus energy",
];

/// 等待 page token 生效的重試次數
const TOKEN_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct GooglePlacesOptions {
    pub api_key: String,
    pub nearby_url: String,
    pub details_url: String,
    pub keyword: String,
    pub search_radius_m: u32,
    pub grid_step_deg: f64,
    pub page_token_delay: Duration,
    /// Google 最多回傳三頁結果
    pub max_pages: u32,
    pub fetch_details: bool,
}

impl GooglePlacesOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            nearby_url: DEFAULT_NEARBY_URL.to_string(),
            details_url: DEFAULT_DETAILS_URL.to_string(),
            keyword: "electric vehicle charging".to_string(),
            search_radius_m: 3000,
            grid_step_deg: 0.3,
            page_token_delay: Duration::from_secs(2),
            max_pages: 3,
            fetch_details: true,
        }
    }
}

pub struct GooglePlacesAdapter {
    options: GooglePlacesOptions,
    http: HttpFetcher,
}

impl GooglePlacesAdapter {
    pub fn new(options: GooglePlacesOptions, http: HttpFetcher) -> Self {
        Self { options, http }
    }

    async fn fetch_nearby(&self, lat: f64, lng: f64) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let mut query = vec![
                ("location", format!("{},{}", lat, lng)),
                ("radius", self.options.search_radius_m.to_string()),
                ("keyword", self.options.keyword.clone()),
                ("key", self.options.api_key.clone()),
            ];
            if let Some(token) = &page_token {
                query.push(("pagetoken", token.clone()));
            }

            let body = self.request_page(&query, page_token.is_some()).await?;
            if let Some(items) = body.get("results").and_then(Value::as_array) {
                results.extend(items.iter().cloned());
            }
            pages += 1;

            match body.get("next_page_token").and_then(Value::as_str) {
                Some(token) if pages < self.options.max_pages => {
                    page_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        tracing::debug!(
            "Nearby Search at {:.4},{:.4} returned {} places over {} page(s)",
            lat,
            lng,
            results.len(),
            pages
        );
        Ok(results)
    }

    /// A fresh page token is rejected with INVALID_REQUEST until Google activates it.
    async fn request_page(&self, query: &[(&str, String)], with_token: bool) -> Result<Value> {
        let attempts = if with_token { TOKEN_RETRIES } else { 1 };

        for _ in 0..attempts {
            if with_token {
                tokio::time::sleep(self.options.page_token_delay).await;
            }
            let body = self.http.get_json(&self.options.nearby_url, query).await?;
            let Some(status) = api_status(&body) else {
                return Err(unexpected_body("Nearby Search"));
            };
            match status {
                "OK" if body.get("results").and_then(Value::as_array).is_none() => {
                    return Err(unexpected_body("Nearby Search"))
                }
                "OK" | "ZERO_RESULTS" => return Ok(body),
                "INVALID_REQUEST" if with_token => continue,
                status => {
                    return Err(EtlError::SourceUnavailable {
                        data_source: Source::GooglePlaces,
                        reason: format!("Nearby Search returned {}{}", status, error_suffix(&body)),
                    })
                }
            }
        }

        Err(EtlError::SourceUnavailable {
            data_source: Source::GooglePlaces,
            reason: "next_page_token was never accepted".to_string(),
        })
    }

    /// `Ok(None)` drops just this place; a denied key or exhausted quota fails the source.
    async fn fetch_details(&self, place_id: &str) -> Result<Option<Value>> {
        let query = [
            ("place_id", place_id.to_string()),
            ("fields", DETAILS_FIELDS.to_string()),
            ("key", self.options.api_key.clone()),
        ];
        match self.http.get_json(&self.options.details_url, &query).await {
            Ok(body) => match api_status(&body) {
                Some("OK") => Ok(body.get("result").cloned()),
                Some(status @ ("REQUEST_DENIED" | "OVER_QUERY_LIMIT")) => {
                    Err(EtlError::SourceUnavailable {
                        data_source: Source::GooglePlaces,
                        reason: format!("Place Details returned {}{}", status, error_suffix(&body)),
                    })
                }
                status => {
                    tracing::warn!(
                        "Place Details for {} returned {}{}",
                        place_id,
                        status.unwrap_or("no status"),
                        error_suffix(&body)
                    );
                    Ok(None)
                }
            },
            Err(e) => {
                tracing::warn!("Place Details for {} failed: {}", place_id, e);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for GooglePlacesAdapter {
    fn source(&self) -> Source {
        Source::GooglePlaces
    }

    async fn fetch(&self, bbox: &BoundingBox) -> Result<SourceBatch> {
        let centers = bbox.grid_centers(self.options.grid_step_deg);
        tracing::info!("🔎 Scanning Google Places grid of {} point(s)", centers.len());

        let mut batch = SourceBatch::default();
        let mut seen = HashSet::new();

        for (lat, lng) in centers {
            for nearby in self.fetch_nearby(lat, lng).await? {
                let Some(place_id) = nearby
                    .get("place_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                else {
                    batch.malformed.push(malformed("", MalformedReason::MissingId));
                    continue;
                };
                if !seen.insert(place_id.clone()) {
                    continue;
                }
                let place_id = place_id.as_str();

                let place = if self.options.fetch_details {
                    match self.fetch_details(place_id).await? {
                        Some(details) => overlay(&nearby, &details),
                        None => {
                            batch
                                .malformed
                                .push(malformed(place_id, MalformedReason::DetailsUnavailable));
                            continue;
                        }
                    }
                } else {
                    nearby
                };

                if !is_charger_place(&place) {
                    batch
                        .malformed
                        .push(malformed(place_id, MalformedReason::NotACharger));
                    continue;
                }

                match normalize_place(place_id, &place) {
                    Ok(point) => {
                        if !point.has_valid_coordinates() {
                            tracing::warn!(
                                "Google place {} has out-of-range coordinates ({}, {})",
                                place_id,
                                point.latitude,
                                point.longitude
                            );
                        }
                        batch.points.push(point);
                    }
                    Err(reason) => batch.malformed.push(malformed(place_id, reason)),
                }
            }
        }

        tracing::info!(
            "Google Places: {} charging points, {} records dropped",
            batch.points.len(),
            batch.malformed.len()
        );
        Ok(batch)
    }
}

fn malformed(external_id: &str, reason: MalformedReason) -> MalformedRecord {
    MalformedRecord {
        source: Source::GooglePlaces,
        external_id: external_id.to_string(),
        reason,
    }
}

fn api_status(body: &Value) -> Option<&str> {
    body.get("status").and_then(Value::as_str)
}

fn unexpected_body(endpoint: &str) -> EtlError {
    EtlError::SourceUnavailable {
        data_source: Source::GooglePlaces,
        reason: format!("unexpected {} body", endpoint),
    }
}

fn error_suffix(body: &Value) -> String {
    body.get("error_message")
        .and_then(Value::as_str)
        .map(|m| format!(": {}", m))
        .unwrap_or_default()
}

/// Details fields win; Nearby Search fills whatever Details left out.
fn overlay(nearby: &Value, details: &Value) -> Value {
    let mut merged = nearby.clone();
    if let (Some(target), Some(source)) = (merged.as_object_mut(), details.as_object()) {
        for (key, value) in source {
            if !value.is_null() {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

pub fn is_charger_place(place: &Value) -> bool {
    let has_charger_type = place
        .get("types")
        .and_then(Value::as_array)
        .map(|types| {
            types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| CHARGER_TYPES.contains(&t.to_lowercase().as_str()))
        })
        .unwrap_or(false);
    if has_charger_type {
        return true;
    }

    let name = text(place, "name").unwrap_or_default().to_lowercase();
    let words: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let name_matches = CHARGER_KEYWORDS.iter().any(|kw| {
        if kw.len() <= 3 {
            words.contains(kw)
        } else {
            name.contains(kw)
        }
    });
    if name_matches {
        return true;
    }

    let address = text(place, "formatted_address")
        .or_else(|| text(place, "vicinity"))
        .unwrap_or_default()
        .to_lowercase();
    address.contains("charging")
        || address
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == "ev")
}

pub fn normalize_place(
    place_id: &str,
    place: &Value,
) -> std::result::Result<NormalizedPoint, MalformedReason> {
    let location = place.get("geometry").and_then(|g| g.get("location"));
    let latitude = location.and_then(|l| l.get("lat")).and_then(Value::as_f64);
    let longitude = location.and_then(|l| l.get("lng")).and_then(Value::as_f64);
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Err(MalformedReason::MissingCoordinates);
    };

    let mut point = NormalizedPoint::new(
        Source::GooglePlaces,
        place_id,
        text(place, "name").unwrap_or_default(),
        latitude,
        longitude,
    );
    point.address = text(place, "formatted_address").or_else(|| text(place, "vicinity"));
    point.status = text(place, "business_status");
    point.phone = text(place, "formatted_phone_number");
    point.rating = place.get("rating").and_then(Value::as_f64);
    point.amenity_tags = place
        .get("types")
        .and_then(Value::as_array)
        .map(|types| {
            types
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(point)
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
