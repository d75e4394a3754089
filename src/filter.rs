//! Metadata Filter: structural predicates of a `QueryPlan` evaluated
//! against a set of stored photos — time range, hybrid GPS/name location
//! matching, and person-name intersection.

use crate::query_plan::{Coords, QueryPlan};
use crate::store::Photo;
use std::collections::HashSet;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Keep photos whose `taken_at` satisfies `[start, end]`. A photo with no
/// `taken_at` is excluded only when at least one bound is set.
pub fn filter_by_time<'a>(photos: &'a [Photo], plan: &QueryPlan) -> Vec<&'a Photo> {
    let range = &plan.time_range;
    if range.is_empty() {
        return photos.iter().collect();
    }

    photos
        .iter()
        .filter(|p| match &p.taken_at {
            None => false,
            Some(taken_at) => {
                let after_start = range.start.as_ref().map(|s| taken_at.as_str() >= s.as_str()).unwrap_or(true);
                let before_end = range.end.as_ref().map(|e| taken_at.as_str() <= e.as_str()).unwrap_or(true);
                after_start && before_end
            }
        })
        .collect()
}

/// Hybrid location filter: the union of a GPS-radius subset and a
/// name-match subset, applied over `candidates`. Deliberately disjoint —
/// the GPS subset requires `gps` present, the name subset requires it
/// absent, so unioning never double-counts a photo.
pub fn filter_by_location<'a>(candidates: &[&'a Photo], location_names: &[String], coords: Option<Coords>) -> Vec<&'a Photo> {
    let gps_subset = filter_by_gps(candidates, coords);
    let name_subset = filter_by_location_name(candidates, location_names);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for p in gps_subset.into_iter().chain(name_subset) {
        if seen.insert(p.id) {
            out.push(p);
        }
    }
    out
}

fn filter_by_gps<'a>(candidates: &[&'a Photo], coords: Option<Coords>) -> Vec<&'a Photo> {
    let Some(coords) = coords else {
        return Vec::new();
    };
    candidates
        .iter()
        .filter_map(|p| {
            let (lat, lon) = p.gps?;
            if haversine_distance(coords.lat, coords.lon, lat, lon) <= coords.radius_km {
                Some(*p)
            } else {
                None
            }
        })
        .collect()
}

fn filter_by_location_name<'a>(candidates: &[&'a Photo], location_names: &[String]) -> Vec<&'a Photo> {
    if location_names.is_empty() {
        return Vec::new();
    }

    let variants: HashSet<String> = location_names
        .iter()
        .take(2)
        .flat_map(|n| normalize_korean_location(n))
        .map(|v| v.to_lowercase())
        .collect();

    candidates
        .iter()
        .filter(|p| {
            if p.gps.is_some() {
                return false;
            }
            let Some(location_name) = &p.location_name else {
                return false;
            };
            let lower = location_name.to_lowercase();
            variants.iter().any(|v| lower.contains(v.as_str()))
        })
        .cloned()
        .collect()
}

/// Korean administrative-suffix normalization: strip the longest
/// matching suffix from {특별자치도, 특별자치시, 광역시, 특별시, 자치도,
/// 자치시, 도, 시, 군, 구}, then add back {시, 도} to the stripped base.
/// Returns the deduplicated set of variants including `name` itself.
pub fn normalize_korean_location(name: &str) -> HashSet<String> {
    const SUFFIXES: &[&str] = &[
        "특별자치도", "특별자치시", "광역시", "특별시", "자치도", "자치시", "도", "시", "군", "구",
    ];

    let mut variants = HashSet::new();
    variants.insert(name.to_string());

    let mut base_name = name.to_string();
    for suffix in SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            if !stripped.is_empty() {
                base_name = stripped.to_string();
                variants.insert(base_name.clone());
                break;
            }
        }
    }

    if base_name != name {
        for suffix in ["시", "도"] {
            variants.insert(format!("{base_name}{suffix}"));
        }
    }

    variants
}

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Keep only photos whose `persons_for` set intersects `people`.
/// `persons_lookup` is supplied by the caller (typically backed by
/// `Store::persons_for`) to keep this module free of store access.
pub fn filter_by_people<'a>(
    candidates: &[&'a Photo],
    people: &[String],
    persons_lookup: impl Fn(i32) -> HashSet<String>,
) -> Vec<&'a Photo> {
    if people.is_empty() {
        return candidates.to_vec();
    }
    let wanted: HashSet<&str> = people.iter().map(|s| s.as_str()).collect();
    candidates
        .iter()
        .filter(|p| {
            let persons = persons_lookup(p.id);
            persons.iter().any(|name| wanted.contains(name.as_str()))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_plan::TimeRange;

    fn photo(id: i32, taken_at: Option<&str>, gps: Option<(f64, f64)>, location_name: Option<&str>) -> Photo {
        Photo {
            id,
            source_ref: format!("file:///{id}.jpg"),
            thumbnail_ref: None,
            uploaded_at: "2024-01-01T00:00:00Z".to_string(),
            taken_at: taken_at.map(|s| s.to_string()),
            gps,
            location_name: location_name.map(|s| s.to_string()),
            embedding: vec![1.0, 0.0],
            metadata: "{}".to_string(),
        }
    }

    #[test]
    fn test_filter_by_time_empty_range_keeps_all() {
        let photos = vec![photo(1, Some("2024-01-01"), None, None), photo(2, None, None, None)];
        let plan = QueryPlan::default();
        assert_eq!(filter_by_time(&photos, &plan).len(), 2);
    }

    #[test]
    fn test_filter_by_time_excludes_missing_taken_at() {
        let photos = vec![
            photo(1, Some("2024-07-01T00:00:00Z"), None, None),
            photo(2, None, None, None),
        ];
        let plan = QueryPlan {
            time_range: TimeRange {
                start: Some("2024-06-01T00:00:00Z".into()),
                end: Some("2024-08-31T23:59:59Z".into()),
            },
            ..Default::default()
        };
        let kept = filter_by_time(&photos, &plan);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn test_normalize_korean_location_jeju() {
        let variants = normalize_korean_location("제주도");
        assert!(variants.contains("제주도"));
        assert!(variants.contains("제주"));
        assert!(variants.contains("제주시"));
    }

    #[test]
    fn test_normalize_korean_location_symmetric() {
        let a = normalize_korean_location("제주");
        let b = normalize_korean_location("제주도");
        assert!(a.intersection(&b).next().is_some());
    }

    #[test]
    fn test_normalize_korean_location_idempotent_on_own_output() {
        let variants = normalize_korean_location("부산광역시");
        for v in &variants {
            let again = normalize_korean_location(v);
            assert!(again.contains(v));
        }
    }

    #[test]
    fn test_haversine_symmetric_and_triangle_inequality() {
        let (a_lat, a_lon) = (37.5665, 126.9780);
        let (b_lat, b_lon) = (35.1796, 129.0756);
        let (c_lat, c_lon) = (33.4996, 126.5312);

        let ab = haversine_distance(a_lat, a_lon, b_lat, b_lon);
        let ba = haversine_distance(b_lat, b_lon, a_lat, a_lon);
        assert!((ab - ba).abs() < 1e-6);

        let ac = haversine_distance(a_lat, a_lon, c_lat, c_lon);
        let cb = haversine_distance(c_lat, c_lon, b_lat, b_lon);
        assert!(ab <= ac + cb + 1e-6);
    }

    #[test]
    fn test_filter_by_location_hybrid_disjoint_union() {
        let photos = vec![
            photo(1, None, Some((37.5665, 126.9780)), None),
            photo(2, None, None, Some("제주시")),
            photo(3, None, None, Some("서울")),
        ];
        let refs: Vec<&Photo> = photos.iter().collect();
        let coords = Some(Coords {
            lat: 37.5665,
            lon: 126.9780,
            radius_km: 5.0,
        });
        let kept = filter_by_location(&refs, &["제주".to_string()], coords);
        let ids: HashSet<i32> = kept.iter().map(|p| p.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert!(!ids.contains(&3));
    }

    #[test]
    fn test_filter_by_people_intersection() {
        let photos = vec![photo(1, None, None, None), photo(2, None, None, None)];
        let refs: Vec<&Photo> = photos.iter().collect();
        let kept = filter_by_people(&refs, &["엄마".to_string()], |id| {
            if id == 1 {
                HashSet::from(["엄마".to_string()])
            } else {
                HashSet::new()
            }
        });
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }
}
