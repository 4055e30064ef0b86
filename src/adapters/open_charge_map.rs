use crate::adapters::http::HttpFetcher;
use crate::domain::model::{
    BoundingBox, Connector, MalformedReason, MalformedRecord, NormalizedPoint, Source,
    SourceBatch,
};
use crate::domain::ports::SourceAdapter;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

pub const DEFAULT_OCM_URL: &str = "https://api.openchargemap.io/v3/poi/";

#[derive(Debug, Clone)]
pub struct OpenChargeMapOptions {
    pub api_key: String,
    pub endpoint: String,
    pub country_code: String,
    pub max_results: u32,
    pub grid_step_deg: f64,
}

impl OpenChargeMapOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_OCM_URL.to_string(),
            country_code: "GB".to_string(),
            max_results: 1000,
            grid_step_deg: 0.01,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcmPoi {
    #[serde(rename = "ID")]
    id: Option<i64>,
    address_info: Option<OcmAddressInfo>,
    operator_info: Option<OcmTitled>,
    usage_type: Option<OcmTitled>,
    status_type: Option<OcmTitled>,
    connections: Option<Vec<OcmConnection>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcmAddressInfo {
    title: Option<String>,
    address_line1: Option<String>,
    town: Option<String>,
    postcode: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcmTitled {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcmConnection {
    connection_type: Option<OcmTitled>,
    #[serde(rename = "PowerKW")]
    power_kw: Option<f64>,
    current_type: Option<OcmTitled>,
    quantity: Option<u32>,
}

pub struct OpenChargeMapAdapter {
    options: OpenChargeMapOptions,
    http: HttpFetcher,
}

impl OpenChargeMapAdapter {
    pub fn new(options: OpenChargeMapOptions, http: HttpFetcher) -> Self {
        Self { options, http }
    }

    async fn fetch_sub_box(&self, sub_box: &BoundingBox) -> Result<Vec<Value>> {
        let bbox_param = format!(
            "({},{}),({},{})",
            sub_box.min_lat, sub_box.min_lon, sub_box.max_lat, sub_box.max_lon
        );
        let query = [
            ("key", self.options.api_key.clone()),
            ("boundingbox", bbox_param.clone()),
            ("output", "json".to_string()),
            ("countrycode", self.options.country_code.clone()),
            ("maxresults", self.options.max_results.to_string()),
            ("compact", "false".to_string()),
            ("verbose", "false".to_string()),
        ];

        let body = self.http.get_json(&self.options.endpoint, &query).await?;
        match body {
            Value::Array(pois) => {
                tracing::debug!("Extracted {} POIs for sub-box {}", pois.len(), bbox_param);
                Ok(pois)
            }
            other => Err(EtlError::SourceUnavailable {
                data_source: Source::OpenChargeMap,
                reason: format!("expected a JSON array of POIs, got {}", json_kind(&other)),
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for OpenChargeMapAdapter {
    fn source(&self) -> Source {
        Source::OpenChargeMap
    }

    async fn fetch(&self, bbox: &BoundingBox) -> Result<SourceBatch> {
        let sub_boxes = bbox.sub_boxes(self.options.grid_step_deg);
        tracing::info!(
            "🔎 Scanning Open Charge Map in {} sub-box(es)",
            sub_boxes.len()
        );

        let mut batch = SourceBatch::default();
        let mut seen = HashSet::new();

        for sub_box in &sub_boxes {
            for raw in self.fetch_sub_box(sub_box).await? {
                // neighbouring sub-boxes share their edges
                if let Some(id) = raw_id(&raw) {
                    if !seen.insert(id) {
                        continue;
                    }
                }
                match normalize_poi(raw) {
                    Ok(point) => {
                        if !point.has_valid_coordinates() {
                            tracing::warn!(
                                "OCM POI {} has out-of-range coordinates ({}, {})",
                                point.external_id,
                                point.latitude,
                                point.longitude
                            );
                        }
                        batch.points.push(point);
                    }
                    Err(record) => {
                        tracing::debug!(
                            "Dropping OCM record '{}': {}",
                            record.external_id,
                            record.reason
                        );
                        batch.malformed.push(record);
                    }
                }
            }
        }

        tracing::info!(
            "Open Charge Map: {} charging points, {} records dropped",
            batch.points.len(),
            batch.malformed.len()
        );
        Ok(batch)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn malformed(external_id: String, reason: MalformedReason) -> MalformedRecord {
    MalformedRecord {
        source: Source::OpenChargeMap,
        external_id,
        reason,
    }
}

fn raw_id(raw: &Value) -> Option<String> {
    match raw.get("ID")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn normalize_poi(raw: Value) -> std::result::Result<NormalizedPoint, MalformedRecord> {
    let id_hint = raw_id(&raw).unwrap_or_default();
    let poi: OcmPoi = serde_json::from_value(raw)
        .map_err(|_| malformed(id_hint, MalformedReason::Unparseable))?;

    let Some(id) = poi.id else {
        return Err(malformed(String::new(), MalformedReason::MissingId));
    };
    let external_id = id.to_string();

    let Some(address) = poi.address_info else {
        return Err(malformed(external_id, MalformedReason::MissingCoordinates));
    };
    let (Some(latitude), Some(longitude)) = (address.latitude, address.longitude) else {
        return Err(malformed(external_id, MalformedReason::MissingCoordinates));
    };

    let mut point = NormalizedPoint::new(
        Source::OpenChargeMap,
        external_id,
        address.title.clone().unwrap_or_default(),
        latitude,
        longitude,
    );
    point.address = join_address(&[&address.address_line1, &address.town, &address.postcode]);
    point.operator = poi.operator_info.and_then(|o| o.title);
    point.usage_type = poi.usage_type.and_then(|u| u.title);
    point.status = poi.status_type.and_then(|s| s.title);
    point.connectors = poi
        .connections
        .unwrap_or_default()
        .into_iter()
        .map(|c| Connector {
            connection_type: c
                .connection_type
                .and_then(|t| t.title)
                .unwrap_or_else(|| "Unknown".to_string()),
            power_kw: c.power_kw,
            current_type: c.current_type.and_then(|t| t.title),
            quantity: c.quantity,
        })
        .collect();
    Ok(point)
}

/// Joins the non-blank parts with ", ".
fn join_address(parts: &[&Option<String>]) -> Option<String> {
    let joined = parts
        .iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::RetryPolicy;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn poi(id: i64, title: &str, lat: f64, lon: f64) -> Value {
        json!({
            "ID": id,
            "AddressInfo": {
                "Title": title,
                "AddressLine1": "12 Long Acre",
                "Town": "London",
                "Postcode": "WC2E 9LH",
                "Latitude": lat,
                "Longitude": lon
            },
            "OperatorInfo": {"Title": "Source London"},
            "UsageType": {"Title": "Public - Membership Required"},
            "StatusType": {"Title": "Operational"},
            "Connections": [
                {"ConnectionType": {"Title": "Type 2 (Socket Only)"}, "PowerKW": 7.0, "CurrentType": {"Title": "AC (Single-Phase)"}, "Quantity": 2},
                {"ConnectionType": {"Title": "CCS (Type 2)"}, "PowerKW": 50.0, "CurrentType": {"Title": "DC"}, "Quantity": 1}
            ]
        })
    }

    fn adapter(server: &MockServer, step: f64) -> OpenChargeMapAdapter {
        let mut options = OpenChargeMapOptions::new("ocm-key");
        options.endpoint = server.url("/v3/poi/");
        options.grid_step_deg = step;
        let http = HttpFetcher::new(
            Source::OpenChargeMap,
            Duration::from_secs(5),
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .unwrap();
        OpenChargeMapAdapter::new(options, http)
    }

    #[test]
    fn test_normalize_poi_maps_fields() {
        let point = normalize_poi(poi(101, "Covent Garden Piazza", 51.512, -0.123)).unwrap();
        assert_eq!(point.external_id, "101");
        assert_eq!(point.name, "Covent Garden Piazza");
        assert_eq!(point.address.as_deref(), Some("12 Long Acre, London, WC2E 9LH"));
        assert_eq!(point.operator.as_deref(), Some("Source London"));
        assert_eq!(point.status.as_deref(), Some("Operational"));
        assert_eq!(point.connectors.len(), 2);
        assert_eq!(point.connectors[1].power_kw, Some(50.0));
        assert_eq!(point.connectors[0].quantity, Some(2));
    }

    #[test]
    fn test_normalize_poi_missing_coordinates() {
        let raw = json!({"ID": 7, "AddressInfo": {"Title": "Nowhere", "Latitude": null}});
        let err = normalize_poi(raw).unwrap_err();
        assert_eq!(err.external_id, "7");
        assert_eq!(err.reason, MalformedReason::MissingCoordinates);

        let err = normalize_poi(json!({"AddressInfo": {"Latitude": 51.5, "Longitude": -0.1}}))
            .unwrap_err();
        assert_eq!(err.reason, MalformedReason::MissingId);
    }

    #[test]
    fn test_join_address_skips_blanks() {
        let line = Some("1 Strand".to_string());
        let town = Some("  ".to_string());
        let postcode = None;
        assert_eq!(
            join_address(&[&line, &town, &postcode]).as_deref(),
            Some("1 Strand")
        );
        assert_eq!(join_address(&[&None, &None]), None);
    }

    #[tokio::test]
    async fn test_fetch_sends_bounding_box_and_dedups_across_sub_boxes() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v3/poi/")
                .query_param("key", "ocm-key")
                .query_param("countrycode", "GB")
                .query_param("compact", "false");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!([
                    poi(1, "Long Acre", 51.512, -0.123),
                    poi(2, "Strand", 51.510, -0.120),
                    {"ID": 3, "AddressInfo": {"Title": "Broken"}}
                ]));
        });

        // 0.02 x 0.02 box with 0.01 step -> four sub-boxes, same payload each time
        let bbox = BoundingBox::new(51.50, 51.52, -0.13, -0.11);
        let batch = adapter(&server, 0.01).fetch(&bbox).await.unwrap();

        api_mock.assert_hits(4);
        assert_eq!(batch.points.len(), 2);
        assert_eq!(batch.malformed.len(), 1);
        assert_eq!(batch.malformed[0].external_id, "3");
        assert_eq!(batch.malformed[0].reason, MalformedReason::MissingCoordinates);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v3/poi/");
            then.status(200).json_body(json!([]));
        });

        let bbox = BoundingBox::new(51.50, 51.51, -0.13, -0.12);
        let batch = adapter(&server, 0.05).fetch(&bbox).await.unwrap();
        assert!(batch.points.is_empty());
    }

    #[tokio::test]
    async fn test_server_failure_is_unavailable() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/v3/poi/");
            then.status(500);
        });

        let bbox = BoundingBox::new(51.50, 51.51, -0.13, -0.12);
        let err = adapter(&server, 0.05).fetch(&bbox).await.unwrap_err();

        api_mock.assert_hits(2);
        assert!(matches!(
            err,
            EtlError::SourceUnavailable {
                data_source: Source::OpenChargeMap,
                ..
            }
        ));
    }
}
