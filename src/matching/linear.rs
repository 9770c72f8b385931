// src/matching/linear.rs

use log::debug;

use super::geometry::{overlap_percentage, valid_km_range};
use super::{CandidateMatch, MatchOutcome, MatchQuality};
use crate::config::GroupMatchConfig;
use crate::models::{InventoryRecord, NeedRecord, TipoMatch};

// Overlap percentages this close are considered tied and broken by id
const OVERLAP_TIE_EPSILON_PCT: f64 = 1e-9;

/// Selects the candidate with the largest overlap for a linear-geometry need.
///
/// Overlap is measured against the need length. A candidate qualifies with
/// any positive overlap at or above the configured minimum; equal overlaps
/// break by smallest cadastro id.
pub(crate) fn best_linear_match(
    need: &NeedRecord,
    candidates: &[&InventoryRecord],
    cfg: &GroupMatchConfig,
) -> MatchOutcome {
    let (need_start, need_end) = match valid_km_range(need.km_inicial, need.km_final) {
        Some(r) => r,
        None => {
            return MatchOutcome::SkippedMissingGeometry {
                motivo: "necessidade sem faixa de km utilizavel".to_string(),
            }
        }
    };

    let mut qualifying: Vec<(f64, &InventoryRecord)> = Vec::new();
    for cand in candidates {
        let (start, end) = match valid_km_range(cand.km_inicial, cand.km_final) {
            Some(r) => r,
            None => continue,
        };
        let pct = overlap_percentage(need_start, need_end, start, end);
        if pct > 0.0 && pct >= cfg.min_overlap_pct {
            qualifying.push((pct, cand));
        }
    }

    if qualifying.is_empty() {
        return MatchOutcome::Unmatched;
    }

    let max_pct = qualifying.iter().map(|(p, _)| *p).fold(0.0, f64::max);

    let best = qualifying
        .iter()
        .filter(|(p, _)| *p >= max_pct - OVERLAP_TIE_EPSILON_PCT)
        .min_by(|(_, a), (_, b)| a.id.cmp(&b.id))
        .map(|(p, c)| (*p, *c))
        .unwrap_or(qualifying[0]);

    let tipo = classify_overlap(best.0, cfg);

    debug!(
        "Linear match: need {} -> cadastro {} at {:.1}% ({})",
        need.id.0,
        best.1.id.0,
        best.0,
        tipo.as_str()
    );

    MatchOutcome::Matched(CandidateMatch {
        cadastro_id: best.1.id.clone(),
        quality: MatchQuality::Linear {
            overlap_porcentagem: best.0,
            tipo_match: tipo,
        },
    })
}

/// Maps an overlap percentage onto its quality tier
pub fn classify_overlap(pct: f64, cfg: &GroupMatchConfig) -> TipoMatch {
    if pct >= 100.0 - cfg.exact_overlap_tolerance_pct {
        TipoMatch::Exato
    } else if pct >= cfg.high_overlap_cutoff_pct {
        TipoMatch::Alto
    } else if pct >= cfg.medium_overlap_cutoff_pct {
        TipoMatch::Medio
    } else {
        TipoMatch::Baixo
    }
}
