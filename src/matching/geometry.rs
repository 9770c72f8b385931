// src/matching/geometry.rs

/// Mean Earth radius in meters, as used by the haversine formula
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two GPS points, in meters (haversine)
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Whether a (lat, lon) pair is usable for point matching
pub fn valid_point(lat: Option<f64>, lon: Option<f64>) -> Option<(f64, f64)> {
    match (lat, lon) {
        (Some(lat), Some(lon))
            if lat.is_finite()
                && lon.is_finite()
                && (-90.0..=90.0).contains(&lat)
                && (-180.0..=180.0).contains(&lon) =>
        {
            Some((lat, lon))
        }
        _ => None,
    }
}

/// Whether a [km_inicial, km_final] pair is a usable non-empty range
pub fn valid_km_range(km_inicial: Option<f64>, km_final: Option<f64>) -> Option<(f64, f64)> {
    match (km_inicial, km_final) {
        (Some(start), Some(end))
            if start.is_finite() && end.is_finite() && start >= 0.0 && end > start =>
        {
            Some((start, end))
        }
        _ => None,
    }
}

/// Overlap of a candidate range over a need range, as a percentage of the
/// need length. Returns 0.0 for disjoint ranges.
pub fn overlap_percentage(
    need_start: f64,
    need_end: f64,
    cand_start: f64,
    cand_end: f64,
) -> f64 {
    let need_length = need_end - need_start;
    if need_length <= 0.0 {
        return 0.0;
    }
    let overlap = (need_end.min(cand_end) - need_start.max(cand_start)).max(0.0);
    overlap / need_length * 100.0
}
