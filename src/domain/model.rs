use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    GooglePlaces,
    OpenChargeMap,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::GooglePlaces, Source::OpenChargeMap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::GooglePlaces => "google_places",
            Source::OpenChargeMap => "open_charge_map",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "google_places" | "google" | "gpa" => Ok(Source::GooglePlaces),
            "open_charge_map" | "ocm" => Ok(Source::OpenChargeMap),
            other => Err(format!(
                "unknown source '{}', expected google_places or open_charge_map",
                other
            )),
        }
    }
}

/// 經緯度矩形範圍 (inclusive edges)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Central London, the default scan area.
    pub fn central_london() -> Self {
        Self::new(51.48, 51.55, -0.20, -0.02)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lon
            && longitude <= self.max_lon
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Tiles the box into sub-boxes of at most `step` degrees per side.
    /// A step that is not a positive finite number yields the whole box.
    pub fn sub_boxes(&self, step: f64) -> Vec<BoundingBox> {
        if !step.is_finite() || step <= 0.0 {
            return vec![*self];
        }
        let mut boxes = Vec::new();
        for lat in grid_starts(self.min_lat, self.max_lat, step) {
            for lon in grid_starts(self.min_lon, self.max_lon, step) {
                boxes.push(BoundingBox::new(
                    lat,
                    (lat + step).min(self.max_lat),
                    lon,
                    (lon + step).min(self.max_lon),
                ));
            }
        }
        boxes
    }

    /// Centres of the sub-boxes; a box smaller than `step` yields its own centre.
    pub fn grid_centers(&self, step: f64) -> Vec<(f64, f64)> {
        self.sub_boxes(step).iter().map(BoundingBox::center).collect()
    }
}

fn grid_starts(min: f64, max: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !(max > min) {
        return vec![min];
    }
    let cells = ((max - min) / step - 1e-6).ceil().max(1.0) as usize;
    (0..cells).map(|i| min + i as f64 * step).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub connection_type: String,
    pub power_kw: Option<f64>,
    pub current_type: Option<String>,
    pub quantity: Option<u32>,
}

/// A source record reshaped into the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub source: Source,
    pub external_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub status: Option<String>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub operator: Option<String>,
    pub usage_type: Option<String>,
    pub connectors: Vec<Connector>,
    pub amenity_tags: Vec<String>,
}

impl NormalizedPoint {
    pub fn new(
        source: Source,
        external_id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            source,
            external_id: external_id.into(),
            name: name.into(),
            latitude,
            longitude,
            address: None,
            status: None,
            phone: None,
            rating: None,
            operator: None,
            usage_type: None,
            connectors: Vec::new(),
            amenity_tags: Vec::new(),
        }
    }

    pub fn has_valid_coordinates(&self) -> bool {
        coordinates_in_range(self.latitude, self.longitude)
    }
}

pub fn coordinates_in_range(latitude: f64, longitude: f64) -> bool {
    latitude >= LATITUDE_RANGE.0
        && latitude <= LATITUDE_RANGE.1
        && longitude >= LONGITUDE_RANGE.0
        && longitude <= LONGITUDE_RANGE.1
}

/// Fields two sources can both supply for a fused point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Coordinates,
    Address,
    Phone,
    Rating,
    AmenityTags,
    Status,
    Operator,
    UsageType,
    Connectors,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Name,
        Field::Coordinates,
        Field::Address,
        Field::Phone,
        Field::Rating,
        Field::AmenityTags,
        Field::Status,
        Field::Operator,
        Field::UsageType,
        Field::Connectors,
    ];
}

/// Which source contributed each populated field.
pub type Provenance = BTreeMap<Field, Source>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPoint {
    pub google_id: Option<String>,
    pub ocm_id: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub status: Option<String>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub operator: Option<String>,
    pub usage_type: Option<String>,
    pub connectors: Vec<Connector>,
    pub amenity_tags: Vec<String>,
    /// Only set for fused points.
    pub match_confidence: Option<f64>,
    pub provenance: Provenance,
    /// External ids of duplicates collapsed into this point by the cleaner.
    pub absorbed_ids: Vec<String>,
}

impl MergedPoint {
    /// Wraps a single unmatched point.
    pub fn pass_through(point: NormalizedPoint) -> Self {
        let source = point.source;
        let mut provenance = Provenance::new();
        provenance.insert(Field::Name, source);
        provenance.insert(Field::Coordinates, source);
        for (field, present) in [
            (Field::Address, point.address.is_some()),
            (Field::Status, point.status.is_some()),
            (Field::Phone, point.phone.is_some()),
            (Field::Rating, point.rating.is_some()),
            (Field::Operator, point.operator.is_some()),
            (Field::UsageType, point.usage_type.is_some()),
            (Field::Connectors, !point.connectors.is_empty()),
            (Field::AmenityTags, !point.amenity_tags.is_empty()),
        ] {
            if present {
                provenance.insert(field, source);
            }
        }

        let (google_id, ocm_id) = match source {
            Source::GooglePlaces => (Some(point.external_id), None),
            Source::OpenChargeMap => (None, Some(point.external_id)),
        };

        Self {
            google_id,
            ocm_id,
            name: point.name,
            latitude: point.latitude,
            longitude: point.longitude,
            address: point.address,
            status: point.status,
            phone: point.phone,
            rating: point.rating,
            operator: point.operator,
            usage_type: point.usage_type,
            connectors: point.connectors,
            amenity_tags: point.amenity_tags,
            match_confidence: None,
            provenance,
            absorbed_ids: Vec::new(),
        }
    }

    pub fn is_fused(&self) -> bool {
        self.google_id.is_some() && self.ocm_id.is_some()
    }

    pub fn sources(&self) -> Vec<Source> {
        let mut sources = Vec::new();
        if self.google_id.is_some() {
            sources.push(Source::GooglePlaces);
        }
        if self.ocm_id.is_some() {
            sources.push(Source::OpenChargeMap);
        }
        sources
    }

    /// Stable label such as `google_places:abc+open_charge_map:42`.
    pub fn record_key(&self) -> String {
        let mut parts = Vec::new();
        if let Some(id) = &self.google_id {
            parts.push(format!("{}:{}", Source::GooglePlaces, id));
        }
        if let Some(id) = &self.ocm_id {
            parts.push(format!("{}:{}", Source::OpenChargeMap, id));
        }
        parts.join("+")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChargingSpeed {
    Slow,
    Fast,
    Rapid,
}

impl ChargingSpeed {
    /// < 7 kW slow, 7..=22 kW fast, above that rapid.
    pub fn classify(power_kw: f64) -> Self {
        if power_kw < 7.0 {
            ChargingSpeed::Slow
        } else if power_kw <= 22.0 {
            ChargingSpeed::Fast
        } else {
            ChargingSpeed::Rapid
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargingSummary {
    pub number_of_connectors: usize,
    pub total_connector_quantity: usize,
    pub min_power_kw: Option<f64>,
    pub max_power_kw: Option<f64>,
    pub max_charging_speed: Option<ChargingSpeed>,
    pub rapid_available: bool,
    pub fast_available: bool,
    pub slow_available: bool,
}

/// Final output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedPoint {
    pub point: MergedPoint,
    pub in_bounding_box: bool,
    pub dedup_group: Option<String>,
    pub charging: ChargingSummary,
}

impl CleanedPoint {
    pub fn latitude(&self) -> f64 {
        self.point.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.point.longitude
    }

    pub fn into_merged(self) -> MergedPoint {
        self.point
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    MissingCoordinates,
    InvalidCoordinates,
    OutOfBounds,
    Duplicate,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExclusionReason::MissingCoordinates => "MISSING_COORDINATES",
            ExclusionReason::InvalidCoordinates => "INVALID_COORDINATES",
            ExclusionReason::OutOfBounds => "OUT_OF_BOUNDS",
            ExclusionReason::Duplicate => "DUPLICATE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub record_key: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MalformedReason {
    MissingId,
    MissingCoordinates,
    NotACharger,
    DetailsUnavailable,
    Unparseable,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MalformedReason::MissingId => "MISSING_ID",
            MalformedReason::MissingCoordinates => "MISSING_COORDINATES",
            MalformedReason::NotACharger => "NOT_A_CHARGER",
            MalformedReason::DetailsUnavailable => "DETAILS_UNAVAILABLE",
            MalformedReason::Unparseable => "UNPARSEABLE",
        };
        f.write_str(label)
    }
}

/// A raw record an adapter dropped during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedRecord {
    pub source: Source,
    pub external_id: String,
    pub reason: MalformedReason,
}

/// What one adapter returned for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    pub points: Vec<NormalizedPoint>,
    pub malformed: Vec<MalformedRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_contains_edges() {
        let bbox = BoundingBox::new(51.49, 51.52, -0.15, -0.05);
        assert!(bbox.contains(51.50, -0.10));
        assert!(bbox.contains(51.49, -0.15));
        assert!(bbox.contains(51.52, -0.05));
        assert!(!bbox.contains(52.0, -0.10));
    }

    #[test]
    fn test_sub_boxes_cover_box() {
        let bbox = BoundingBox::central_london();
        let boxes = bbox.sub_boxes(0.05);
        // 0.07 lat -> 2 rows, 0.18 lon -> 4 columns
        assert_eq!(boxes.len(), 8);
        assert!(boxes.iter().all(|b| b.max_lat <= bbox.max_lat && b.max_lon <= bbox.max_lon));
        assert!((boxes.last().unwrap().max_lon - bbox.max_lon).abs() < 1e-12);
    }

    #[test]
    fn test_grid_centers_small_box_single_center() {
        let bbox = BoundingBox::central_london();
        let centers = bbox.grid_centers(0.3);
        assert_eq!(centers.len(), 1);
        assert!((centers[0].0 - 51.515).abs() < 1e-9);
        assert!((centers[0].1 + 0.11).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_step_yields_whole_box() {
        let bbox = BoundingBox::central_london();
        for step in [0.0, -0.05, f64::NAN, f64::INFINITY] {
            assert_eq!(bbox.sub_boxes(step), vec![bbox]);
            assert_eq!(bbox.grid_centers(step), vec![bbox.center()]);
        }
    }

    #[test]
    fn test_source_from_str() {
        assert_eq!("ocm".parse::<Source>().unwrap(), Source::OpenChargeMap);
        assert_eq!(
            "google-places".parse::<Source>().unwrap(),
            Source::GooglePlaces
        );
        assert!("bing".parse::<Source>().is_err());
    }

    #[test]
    fn test_pass_through_provenance_is_single_source() {
        let mut point = NormalizedPoint::new(Source::OpenChargeMap, "42", "Depot", 51.5, -0.1);
        point.operator = Some("Source London".to_string());
        let merged = MergedPoint::pass_through(point);

        assert_eq!(merged.ocm_id.as_deref(), Some("42"));
        assert!(merged.google_id.is_none());
        assert!(merged.match_confidence.is_none());
        assert!(merged
            .provenance
            .values()
            .all(|s| *s == Source::OpenChargeMap));
        assert_eq!(merged.provenance.get(&Field::Operator), Some(&Source::OpenChargeMap));
        assert!(!merged.provenance.contains_key(&Field::Phone));
    }

    #[test]
    fn test_charging_speed_thresholds() {
        assert_eq!(ChargingSpeed::classify(3.7), ChargingSpeed::Slow);
        assert_eq!(ChargingSpeed::classify(7.0), ChargingSpeed::Fast);
        assert_eq!(ChargingSpeed::classify(22.0), ChargingSpeed::Fast);
        assert_eq!(ChargingSpeed::classify(50.0), ChargingSpeed::Rapid);
    }
}
