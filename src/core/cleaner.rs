use crate::core::charging::summarize;
use crate::core::matcher::normalize_name;
use crate::domain::model::{
    coordinates_in_range, BoundingBox, CleanedPoint, Exclusion, ExclusionReason, MergedPoint,
};
use std::collections::BTreeMap;

pub const DEFAULT_COORDINATE_PRECISION: u32 = 5;

/// What happens to rows outside the bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfBoundsPolicy {
    #[default]
    Exclude,
    Flag,
}

impl OutOfBoundsPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exclude" => Some(OutOfBoundsPolicy::Exclude),
            "flag" => Some(OutOfBoundsPolicy::Flag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanerOptions {
    pub out_of_bounds: OutOfBoundsPolicy,
    /// Decimal places coordinates are rounded to when grouping duplicates.
    pub coordinate_precision: u32,
}

impl Default for CleanerOptions {
    fn default() -> Self {
        Self {
            out_of_bounds: OutOfBoundsPolicy::Exclude,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanOutcome {
    pub points: Vec<CleanedPoint>,
    pub exclusions: Vec<Exclusion>,
}

impl CleanOutcome {
    pub fn excluded_count(&self, reason: ExclusionReason) -> usize {
        self.exclusions.iter().filter(|e| e.reason == reason).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    options: CleanerOptions,
}

impl Cleaner {
    pub fn new(options: CleanerOptions) -> Self {
        Self { options }
    }

    /// Never fails: each row is either kept or excluded with a reason.
    pub fn clean(&self, points: Vec<MergedPoint>, bbox: &BoundingBox) -> CleanOutcome {
        let mut exclusions = Vec::new();
        let mut kept = Vec::new();

        for point in points {
            let key = point.record_key();

            if !point.latitude.is_finite() || !point.longitude.is_finite() {
                exclude(&mut exclusions, key, ExclusionReason::MissingCoordinates);
                continue;
            }
            if !coordinates_in_range(point.latitude, point.longitude) {
                exclude(&mut exclusions, key, ExclusionReason::InvalidCoordinates);
                continue;
            }

            let in_bounding_box = bbox.contains(point.latitude, point.longitude);
            if !in_bounding_box && self.options.out_of_bounds == OutOfBoundsPolicy::Exclude {
                exclude(&mut exclusions, key, ExclusionReason::OutOfBounds);
                continue;
            }

            kept.push((normalize_fields(point), in_bounding_box));
        }

        let points = self.deduplicate(kept, &mut exclusions);

        tracing::debug!(
            "Cleaner kept {} row(s), excluded {}",
            points.len(),
            exclusions.len()
        );
        CleanOutcome { points, exclusions }
    }

    fn dedup_key(&self, point: &MergedPoint) -> String {
        let precision = self.options.coordinate_precision as usize;
        format!(
            "{}@{:.*},{:.*}",
            normalize_name(&point.name),
            precision,
            round_coordinate(point.latitude, precision),
            precision,
            round_coordinate(point.longitude, precision)
        )
    }

    fn deduplicate(
        &self,
        rows: Vec<(MergedPoint, bool)>,
        exclusions: &mut Vec<Exclusion>,
    ) -> Vec<CleanedPoint> {
        // group order follows first appearance
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<(MergedPoint, bool)>> = BTreeMap::new();
        for (point, in_box) in rows {
            let key = self.dedup_key(&point);
            let members = groups.entry(key.clone()).or_default();
            if members.is_empty() {
                order.push(key);
            }
            members.push((point, in_box));
        }

        let mut cleaned = Vec::with_capacity(order.len());
        for key in order {
            let Some(mut members) = groups.remove(&key) else {
                continue;
            };
            members.sort_by(|(a, _), (b, _)| {
                b.is_fused()
                    .cmp(&a.is_fused())
                    .then_with(|| a.google_id.cmp(&b.google_id))
                    .then_with(|| a.ocm_id.cmp(&b.ocm_id))
            });

            let mut members = members.into_iter();
            let Some((mut representative, in_bounding_box)) = members.next() else {
                continue;
            };
            for (duplicate, _) in members {
                exclude(exclusions, duplicate.record_key(), ExclusionReason::Duplicate);
                representative.absorbed_ids.push(duplicate.record_key());
                representative.absorbed_ids.extend(duplicate.absorbed_ids);
            }

            let dedup_group = (!representative.absorbed_ids.is_empty()).then_some(key);
            let charging = summarize(&representative.connectors);
            cleaned.push(CleanedPoint {
                point: representative,
                in_bounding_box,
                dedup_group,
                charging,
            });
        }
        cleaned
    }
}

fn exclude(exclusions: &mut Vec<Exclusion>, record_key: String, reason: ExclusionReason) {
    tracing::debug!("Excluding {}: {}", record_key, reason);
    exclusions.push(Exclusion { record_key, reason });
}

/// Collapses whitespace, maps OCM placeholder values and turns blanks into `None`.
fn normalize_fields(mut point: MergedPoint) -> MergedPoint {
    point.name = collapse_whitespace(&point.name);
    point.address = clean_text(point.address);
    point.status = clean_text(point.status);
    point.phone = clean_text(point.phone);
    point.operator = clean_text(point.operator).and_then(|op| match op.as_str() {
        "(Unknown Operator)" => None,
        "(Business Owner at Location)" => Some("Business Owner at Location".to_string()),
        _ => Some(op),
    });
    point.usage_type = clean_text(point.usage_type).filter(|u| u != "(Unknown)");
    point.amenity_tags = point
        .amenity_tags
        .iter()
        .map(|t| collapse_whitespace(t))
        .filter(|t| !t.is_empty())
        .collect();
    for connector in &mut point.connectors {
        connector.connection_type = collapse_whitespace(&connector.connection_type);
        connector.current_type = clean_text(connector.current_type.take());
        connector.power_kw = connector.power_kw.filter(|kw| kw.is_finite() && *kw >= 0.0);
    }
    point.rating = point.rating.filter(|r| r.is_finite());
    point
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}

/// Adding `0.0` folds `-0.0` into `0.0` so both sides of a meridian share a key.
fn round_coordinate(value: f64, precision: usize) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ChargingSpeed, Connector, NormalizedPoint, Source};

    fn bbox() -> BoundingBox {
        BoundingBox::new(51.49, 51.52, -0.15, -0.05)
    }

    fn ocm_point(id: &str, name: &str, lat: f64, lon: f64) -> MergedPoint {
        MergedPoint::pass_through(NormalizedPoint::new(Source::OpenChargeMap, id, name, lat, lon))
    }

    fn google_point(id: &str, name: &str, lat: f64, lon: f64) -> MergedPoint {
        MergedPoint::pass_through(NormalizedPoint::new(Source::GooglePlaces, id, name, lat, lon))
    }

    #[test]
    fn test_bounding_box_scenario() {
        let outcome = Cleaner::default().clean(
            vec![
                ocm_point("1", "Inside", 51.50, -0.10),
                ocm_point("2", "Outside", 52.0, -0.10),
            ],
            &bbox(),
        );

        assert_eq!(outcome.points.len(), 1);
        assert!(outcome.points[0].in_bounding_box);
        assert_eq!(outcome.points[0].point.ocm_id.as_deref(), Some("1"));
        assert_eq!(outcome.exclusions.len(), 1);
        assert_eq!(outcome.exclusions[0].reason, ExclusionReason::OutOfBounds);
        assert_eq!(outcome.exclusions[0].record_key, "open_charge_map:2");
    }

    #[test]
    fn test_flag_policy_keeps_out_of_bounds_rows() {
        let cleaner = Cleaner::new(CleanerOptions {
            out_of_bounds: OutOfBoundsPolicy::Flag,
            ..CleanerOptions::default()
        });
        let outcome = cleaner.clean(vec![ocm_point("2", "Outside", 52.0, -0.10)], &bbox());

        assert_eq!(outcome.points.len(), 1);
        assert!(!outcome.points[0].in_bounding_box);
        assert!(outcome.exclusions.is_empty());
    }

    #[test]
    fn test_coordinate_checks() {
        let outcome = Cleaner::default().clean(
            vec![
                ocm_point("nan", "Broken", f64::NAN, -0.10),
                ocm_point("far", "Broken", 95.0, -0.10),
                ocm_point("lon", "Broken", 51.5, 200.0),
            ],
            &bbox(),
        );

        assert!(outcome.points.is_empty());
        assert_eq!(outcome.excluded_count(ExclusionReason::MissingCoordinates), 1);
        assert_eq!(outcome.excluded_count(ExclusionReason::InvalidCoordinates), 2);
    }

    #[test]
    fn test_duplicates_collapse_to_fused_representative() {
        let mut fused = google_point("g1", "Tesco  EV Charger", 51.500001, -0.100001);
        fused.ocm_id = Some("o1".to_string());

        let outcome = Cleaner::default().clean(
            vec![
                ocm_point("o7", "tesco ev charger", 51.500002, -0.100002),
                fused,
                ocm_point("o8", "Tesco EV Charger", 51.51, -0.10),
            ],
            &bbox(),
        );

        assert_eq!(outcome.points.len(), 2);
        let rep = &outcome.points[0];
        assert_eq!(rep.point.google_id.as_deref(), Some("g1"));
        assert_eq!(rep.point.name, "Tesco EV Charger");
        assert_eq!(rep.point.absorbed_ids, vec!["open_charge_map:o7".to_string()]);
        assert_eq!(
            rep.dedup_group.as_deref(),
            Some("tesco ev charger@51.50000,-0.10000")
        );
        assert!(outcome.points[1].dedup_group.is_none());
        assert_eq!(outcome.excluded_count(ExclusionReason::Duplicate), 1);
    }

    #[test]
    fn test_duplicates_across_prime_meridian_collapse() {
        let greenwich = BoundingBox::new(51.47, 51.49, -0.01, 0.01);
        let outcome = Cleaner::default().clean(
            vec![
                ocm_point("1", "Hub", 51.48, -0.000001),
                ocm_point("2", "Hub", 51.48, 0.000001),
            ],
            &greenwich,
        );

        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.excluded_count(ExclusionReason::Duplicate), 1);
        assert_eq!(
            outcome.points[0].dedup_group.as_deref(),
            Some("hub@51.48000,0.00000")
        );
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let cleaner = Cleaner::default();
        let input = vec![
            ocm_point("1", " Soho   Square ", 51.515, -0.132),
            ocm_point("2", "soho square", 51.515, -0.132),
            ocm_point("3", "Covent Garden", 51.512, -0.123),
            ocm_point("4", "Far Away", 53.0, -2.0),
        ];

        let first = cleaner.clean(input, &bbox());
        let second = cleaner.clean(
            first.points.iter().cloned().map(CleanedPoint::into_merged).collect(),
            &bbox(),
        );

        assert_eq!(first.points, second.points);
        assert!(second.exclusions.is_empty());
    }

    #[test]
    fn test_retained_rows_satisfy_invariants() {
        let outcome = Cleaner::default().clean(
            vec![
                ocm_point("1", "A", 51.50, -0.10),
                ocm_point("2", "B", -91.0, -0.10),
                ocm_point("3", "C", 51.60, -0.10),
                ocm_point("4", "D", 51.51, -0.06),
            ],
            &bbox(),
        );

        for point in &outcome.points {
            assert!(point.in_bounding_box);
            assert!((-90.0..=90.0).contains(&point.latitude()));
            assert!((-180.0..=180.0).contains(&point.longitude()));
        }
        assert_eq!(outcome.points.len(), 2);
    }

    #[test]
    fn test_normalizes_placeholders_without_fabricating() {
        let mut point = ocm_point("9", "Depot", 51.50, -0.10);
        point.operator = Some("(Unknown Operator)".to_string());
        point.usage_type = Some("(Unknown)".to_string());
        point.address = Some("   ".to_string());
        point.status = Some(" Operational ".to_string());
        point.connectors = vec![Connector {
            connection_type: "CCS  (Type 2)".to_string(),
            power_kw: Some(50.0),
            current_type: Some("".to_string()),
            quantity: None,
        }];

        let outcome = Cleaner::default().clean(vec![point], &bbox());
        let cleaned = &outcome.points[0];

        assert_eq!(cleaned.point.operator, None);
        assert_eq!(cleaned.point.usage_type, None);
        assert_eq!(cleaned.point.address, None);
        assert_eq!(cleaned.point.status.as_deref(), Some("Operational"));
        assert_eq!(cleaned.point.connectors[0].connection_type, "CCS (Type 2)");
        assert_eq!(cleaned.point.connectors[0].current_type, None);
        assert_eq!(cleaned.charging.max_charging_speed, Some(ChargingSpeed::Rapid));
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(OutOfBoundsPolicy::parse("Flag"), Some(OutOfBoundsPolicy::Flag));
        assert_eq!(OutOfBoundsPolicy::parse("exclude"), Some(OutOfBoundsPolicy::Exclude));
        assert_eq!(OutOfBoundsPolicy::parse("drop"), None);
    }
}
