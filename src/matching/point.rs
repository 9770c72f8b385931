// src/matching/point.rs

use log::debug;

use super::geometry::{haversine_distance_meters, valid_point};
use super::{CandidateMatch, MatchOutcome, MatchQuality};
use crate::config::GroupMatchConfig;
use crate::models::{InventoryRecord, NeedRecord};

/// Selects the closest qualifying candidate for a point-geometry need.
///
/// A candidate qualifies when its distance is within the group threshold.
/// Distances within the tie epsilon of the minimum are treated as tied and
/// broken by smallest cadastro id, so reruns are stable.
pub(crate) fn best_point_match(
    need: &NeedRecord,
    candidates: &[&InventoryRecord],
    cfg: &GroupMatchConfig,
) -> MatchOutcome {
    let (need_lat, need_lon) = match valid_point(need.latitude, need.longitude) {
        Some(p) => p,
        None => {
            return MatchOutcome::SkippedMissingGeometry {
                motivo: "necessidade sem coordenadas GPS utilizaveis".to_string(),
            }
        }
    };

    let mut qualifying: Vec<(f64, &InventoryRecord)> = Vec::new();
    for cand in candidates {
        let (lat, lon) = match valid_point(cand.latitude, cand.longitude) {
            Some(p) => p,
            // Malformed candidate geometry excludes the candidate only
            None => continue,
        };
        let distance = haversine_distance_meters(need_lat, need_lon, lat, lon);
        if distance <= cfg.max_distance_meters {
            qualifying.push((distance, cand));
        }
    }

    if qualifying.is_empty() {
        return MatchOutcome::Unmatched;
    }

    let min_distance = qualifying
        .iter()
        .map(|(d, _)| *d)
        .fold(f64::INFINITY, f64::min);

    // Among candidates tied with the minimum, the smallest id wins
    let best = qualifying
        .iter()
        .filter(|(d, _)| *d <= min_distance + cfg.tie_epsilon_meters)
        .min_by(|(_, a), (_, b)| a.id.cmp(&b.id))
        .map(|(d, c)| (*d, *c))
        .unwrap_or_else(|| {
            let (d, c) = qualifying[0];
            (d, c)
        });

    debug!(
        "Point match: need {} -> cadastro {} at {:.2}m ({} candidates in scope)",
        need.id.0,
        best.1.id.0,
        best.0,
        candidates.len()
    );

    MatchOutcome::Matched(CandidateMatch {
        cadastro_id: best.1.id.clone(),
        quality: MatchQuality::Point {
            distancia_metros: best.0,
        },
    })
}
