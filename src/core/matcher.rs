use crate::domain::model::{Field, MergedPoint, NormalizedPoint, Provenance, Source};
use geo::{HaversineDistance, Point};

pub const DEFAULT_MATCH_RADIUS_M: f64 = 50.0;

const PROXIMITY_WEIGHT: f64 = 0.6;
const NAME_WEIGHT: f64 = 0.4;

/// Winner of every field both sources can supply for a fused point.
/// Google Places owns naming and place metadata; Open Charge Map owns charging detail.
pub fn field_winner(field: Field) -> Source {
    match field {
        Field::Name
        | Field::Coordinates
        | Field::Address
        | Field::Phone
        | Field::Rating
        | Field::AmenityTags => Source::GooglePlaces,
        Field::Status | Field::Operator | Field::UsageType | Field::Connectors => {
            Source::OpenChargeMap
        }
    }
}

/// Lower-cased with whitespace runs collapsed to one space.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaro-Winkler similarity of the normalized names; 0 when either is blank.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_name(a), normalize_name(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(&a, &b)
}

pub fn distance_m(a: &NormalizedPoint, b: &NormalizedPoint) -> f64 {
    let pa = Point::new(a.longitude, a.latitude);
    let pb = Point::new(b.longitude, b.latitude);
    pa.haversine_distance(&pb)
}

#[derive(Debug, Clone)]
pub struct MatcherOptions {
    pub radius_m: f64,
    /// Candidates whose names are less similar than this are ignored; 0 disables the check.
    pub min_name_similarity: f64,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_MATCH_RADIUS_M,
            min_name_similarity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub merged: Vec<MergedPoint>,
    pub matched_pairs: usize,
}

/// Greedy nearest-neighbour pairing of Google Places and OCM points.
#[derive(Debug, Clone, Default)]
pub struct GeoMatcher {
    options: MatcherOptions,
}

impl GeoMatcher {
    pub fn new(options: MatcherOptions) -> Self {
        Self { options }
    }

    pub fn match_points(
        &self,
        mut google: Vec<NormalizedPoint>,
        mut ocm: Vec<NormalizedPoint>,
    ) -> MatchOutcome {
        // input order must not influence the pairing
        google.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        ocm.sort_by(|a, b| a.external_id.cmp(&b.external_id));

        let mut pair_of: Vec<Option<usize>> = vec![None; google.len()];
        let mut ocm_taken = vec![false; ocm.len()];

        for (gi, g) in google.iter().enumerate() {
            if !g.has_valid_coordinates() {
                continue;
            }
            let mut best: Option<(usize, f64)> = None;
            for (oi, o) in ocm.iter().enumerate() {
                if ocm_taken[oi] || !o.has_valid_coordinates() {
                    continue;
                }
                let d = distance_m(g, o);
                if d > self.options.radius_m {
                    continue;
                }
                if name_similarity(&g.name, &o.name) < self.options.min_name_similarity {
                    continue;
                }
                // ocm is sorted by id, so a strict comparison keeps the lower id on ties
                if best.map_or(true, |(_, best_d)| d < best_d) {
                    best = Some((oi, d));
                }
            }
            if let Some((oi, _)) = best {
                ocm_taken[oi] = true;
                pair_of[gi] = Some(oi);
            }
        }

        let mut ocm_slots: Vec<Option<NormalizedPoint>> = ocm.into_iter().map(Some).collect();
        let mut fused = Vec::new();
        let mut lone_google = Vec::new();

        for (g, pair) in google.into_iter().zip(pair_of) {
            match pair.and_then(|oi| ocm_slots[oi].take()) {
                Some(o) => fused.push(self.fuse(g, o)),
                None => lone_google.push(MergedPoint::pass_through(g)),
            }
        }

        let matched_pairs = fused.len();
        let mut merged = fused;
        merged.extend(lone_google);
        merged.extend(ocm_slots.into_iter().flatten().map(MergedPoint::pass_through));

        tracing::debug!(
            "Geo-matcher paired {} point(s), {} merged points in total",
            matched_pairs,
            merged.len()
        );
        MatchOutcome {
            merged,
            matched_pairs,
        }
    }

    fn confidence(&self, distance: f64, similarity: f64) -> f64 {
        let proximity = if self.options.radius_m > 0.0 {
            (1.0 - distance / self.options.radius_m).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let score = PROXIMITY_WEIGHT * proximity + NAME_WEIGHT * similarity;
        (score * 10_000.0).round() / 10_000.0
    }

    fn fuse(&self, g: NormalizedPoint, o: NormalizedPoint) -> MergedPoint {
        let confidence = self.confidence(distance_m(&g, &o), name_similarity(&g.name, &o.name));
        let mut provenance = Provenance::new();

        let name = resolve(
            Field::Name,
            non_blank(g.name),
            non_blank(o.name),
            &mut provenance,
        )
        .unwrap_or_default();
        let (latitude, longitude) = resolve(
            Field::Coordinates,
            Some((g.latitude, g.longitude)),
            Some((o.latitude, o.longitude)),
            &mut provenance,
        )
        .unwrap_or((g.latitude, g.longitude));

        MergedPoint {
            google_id: Some(g.external_id),
            ocm_id: Some(o.external_id),
            name,
            latitude,
            longitude,
            address: resolve(Field::Address, g.address, o.address, &mut provenance),
            status: resolve(Field::Status, g.status, o.status, &mut provenance),
            phone: resolve(Field::Phone, g.phone, o.phone, &mut provenance),
            rating: resolve(Field::Rating, g.rating, o.rating, &mut provenance),
            operator: resolve(Field::Operator, g.operator, o.operator, &mut provenance),
            usage_type: resolve(Field::UsageType, g.usage_type, o.usage_type, &mut provenance),
            connectors: resolve(
                Field::Connectors,
                non_empty(g.connectors),
                non_empty(o.connectors),
                &mut provenance,
            )
            .unwrap_or_default(),
            amenity_tags: resolve(
                Field::AmenityTags,
                non_empty(g.amenity_tags),
                non_empty(o.amenity_tags),
                &mut provenance,
            )
            .unwrap_or_default(),
            match_confidence: Some(confidence),
            provenance,
            absorbed_ids: Vec::new(),
        }
    }
}

/// Takes the winner's value when present, otherwise the other source's.
fn resolve<T>(
    field: Field,
    google: Option<T>,
    ocm: Option<T>,
    provenance: &mut Provenance,
) -> Option<T> {
    let (first, second, first_source, second_source) = match field_winner(field) {
        Source::GooglePlaces => (google, ocm, Source::GooglePlaces, Source::OpenChargeMap),
        Source::OpenChargeMap => (ocm, google, Source::OpenChargeMap, Source::GooglePlaces),
    };
    match (first, second) {
        (Some(value), _) => {
            provenance.insert(field, first_source);
            Some(value)
        }
        (None, Some(value)) => {
            provenance.insert(field, second_source);
            Some(value)
        }
        (None, None) => None,
    }
}

fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}
