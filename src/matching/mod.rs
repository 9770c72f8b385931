// src/matching/mod.rs

pub mod geometry;
pub mod linear;
pub mod point;

use crate::config::{GroupMatchConfig, MatchGeometry};
use crate::models::{CadastroId, InventoryRecord, NeedRecord, TipoMatch};

/// Match-quality metadata recorded alongside a successful match
#[derive(Debug, Clone, PartialEq)]
pub enum MatchQuality {
    /// Point-geometry match: distance between the two GPS points
    Point { distancia_metros: f64 },

    /// Linear-geometry match: overlap over the need length and its tier
    Linear {
        overlap_porcentagem: f64,
        tipo_match: TipoMatch,
    },
}

/// The single best candidate selected for a need
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub cadastro_id: CadastroId,
    pub quality: MatchQuality,
}

/// Outcome of running the candidate matcher for one need
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// A candidate qualified; quality metadata attached
    Matched(CandidateMatch),

    /// No candidate qualified under the group thresholds
    Unmatched,

    /// The need itself lacks usable geometry; matching was not attempted
    SkippedMissingGeometry { motivo: String },
}

/// Finds the best inventory candidate for a need, per the group's geometry
/// mode.
///
/// Candidates outside the need's group/lote/rodovia scope are ignored, which
/// keeps the scope invariant even if the caller fetched too broadly. A
/// candidate with malformed geometry is excluded, never a hard failure.
pub fn match_need(
    need: &NeedRecord,
    candidates: &[InventoryRecord],
    cfg: &GroupMatchConfig,
) -> MatchOutcome {
    let in_scope: Vec<&InventoryRecord> = candidates
        .iter()
        .filter(|c| {
            c.grupo == need.grupo && c.lote_id == need.lote_id && c.rodovia_id == need.rodovia_id
        })
        .collect();

    match cfg.geometry {
        MatchGeometry::Point => point::best_point_match(need, &in_scope, cfg),
        MatchGeometry::Linear => linear::best_linear_match(need, &in_scope, cfg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::models::ElementGroup;
    use crate::test_fixtures::{inventory_linear, inventory_point, need_linear, need_point};

    #[test]
    fn candidates_from_other_scopes_are_ignored() {
        let cfg = MatchingConfig::default();
        let placas = cfg.for_group(ElementGroup::Placas).unwrap();

        let need = need_point("n1", -27.5954, -48.5480);
        let mut other_lote = inventory_point("c1", -27.5954, -48.5480);
        other_lote.lote_id = crate::models::LoteId("lote-99".into());

        assert_eq!(match_need(&need, &[other_lote], placas), MatchOutcome::Unmatched);
    }

    #[test]
    fn dispatch_follows_group_geometry() {
        let cfg = MatchingConfig::default();
        let placas = cfg.for_group(ElementGroup::Placas).unwrap();
        let defensas = cfg.for_group(ElementGroup::Defensas).unwrap();

        let need = need_point("n1", -27.5954, -48.5480);
        let inv = inventory_point("c1", -27.5954, -48.5481);
        match match_need(&need, &[inv], placas) {
            MatchOutcome::Matched(m) => {
                assert!(matches!(m.quality, MatchQuality::Point { .. }));
            }
            other => panic!("expected point match, got {:?}", other),
        }

        let need = need_linear("n2", 10.0, 10.5);
        let inv = inventory_linear("c2", 10.0, 10.5);
        match match_need(&need, &[inv], defensas) {
            MatchOutcome::Matched(m) => {
                assert!(matches!(m.quality, MatchQuality::Linear { .. }));
            }
            other => panic!("expected linear match, got {:?}", other),
        }
    }
}
