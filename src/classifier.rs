// src/classifier.rs

use chrono::NaiveDateTime;
use log::debug;

use crate::matching::{MatchOutcome, MatchQuality};
use crate::models::{
    CadastroId, InventoryRecord, NeedRecord, Servico, StatusReconciliacao, TipoMatch,
};

/// The classifier's verdict for one need, before it is applied to the record
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub servico: Servico,
    pub cadastro_id: Option<CadastroId>,
    pub distancia_match_metros: Option<f64>,
    pub overlap_porcentagem: Option<f64>,
    pub tipo_match: Option<TipoMatch>,

    /// Set when the need was skipped for missing geometry and must be flagged
    /// for manual review
    pub motivo_revisao: Option<String>,
}

/// Assigns a service action from the matcher's outcome and the plan context.
///
/// Policy:
/// - no qualifying candidate (or skipped geometry) -> Implantar
/// - matched + plan marks removal -> Remover
/// - matched + plan marks replacement, or plan and inventory attributes are
///   incompatible -> Substituir
/// - matched otherwise -> Manter
pub fn classify(
    need: &NeedRecord,
    outcome: &MatchOutcome,
    matched_inventory: Option<&InventoryRecord>,
) -> Classification {
    match outcome {
        MatchOutcome::SkippedMissingGeometry { motivo } => Classification {
            servico: Servico::Implantar,
            cadastro_id: None,
            distancia_match_metros: None,
            overlap_porcentagem: None,
            tipo_match: None,
            motivo_revisao: Some(motivo.clone()),
        },
        MatchOutcome::Unmatched => Classification {
            servico: Servico::Implantar,
            cadastro_id: None,
            distancia_match_metros: None,
            overlap_porcentagem: None,
            tipo_match: None,
            motivo_revisao: None,
        },
        MatchOutcome::Matched(m) => {
            let servico = match need.plano_servico {
                Some(Servico::Remover) => Servico::Remover,
                Some(Servico::Substituir) => Servico::Substituir,
                Some(Servico::Manter) => Servico::Manter,
                // No explicit plan code (or a stale Implantar despite a
                // match): decide from attribute compatibility
                _ => {
                    let compatible = matched_inventory
                        .map(|inv| attributes_compatible(&need.atributos, &inv.atributos))
                        .unwrap_or(true);
                    if compatible {
                        Servico::Manter
                    } else {
                        Servico::Substituir
                    }
                }
            };

            let (distancia, overlap, tipo) = match &m.quality {
                MatchQuality::Point { distancia_metros } => (Some(*distancia_metros), None, None),
                MatchQuality::Linear {
                    overlap_porcentagem,
                    tipo_match,
                } => (None, Some(*overlap_porcentagem), Some(*tipo_match)),
            };

            Classification {
                servico,
                cadastro_id: Some(m.cadastro_id.clone()),
                distancia_match_metros: distancia,
                overlap_porcentagem: overlap,
                tipo_match: tipo,
                motivo_revisao: None,
            }
        }
    }
}

/// Applies a classification to a need record.
///
/// Sets the match-quality fields, flags a divergence when the computed
/// servico disagrees with a previously stored decision, and resets the
/// workflow state so a flagged record re-enters the pending queue.
pub fn apply_classification(
    need: &mut NeedRecord,
    classification: Classification,
    now: NaiveDateTime,
) {
    let previous_decision = need.servico;
    let diverged = matches!(previous_decision, Some(prev) if prev != classification.servico);

    if diverged {
        debug!(
            "Classifier: need {} diverged ({} -> {})",
            need.id.0,
            previous_decision.map(|s| s.as_str()).unwrap_or("-"),
            classification.servico.as_str()
        );
    }

    need.servico = Some(classification.servico);
    need.cadastro_id = classification.cadastro_id;
    need.distancia_match_metros = classification.distancia_match_metros;
    need.overlap_porcentagem = classification.overlap_porcentagem;
    need.tipo_match = classification.tipo_match;

    if let Some(motivo) = classification.motivo_revisao {
        need.status_revisao = Some("pendente".to_string());
        need.motivo_revisao = Some(motivo);
    }

    need.divergencia = diverged;
    need.reconciliado = false;
    need.status_reconciliacao = if diverged {
        StatusReconciliacao::DivergentePendente
    } else {
        StatusReconciliacao::SemDivergencia
    };
    need.atualizado_em = Some(now);
}

/// Attribute compatibility between the plan side and the inventory side.
///
/// Both sides carry the same group-specific attribute shape as JSON objects.
/// Every key present on both sides must agree; keys present on only one side
/// carry no signal and are ignored. Non-object payloads are treated as
/// compatible.
pub fn attributes_compatible(plan: &serde_json::Value, inventory: &serde_json::Value) -> bool {
    match (plan.as_object(), inventory.as_object()) {
        (Some(plan_map), Some(inv_map)) => plan_map.iter().all(|(key, plan_value)| {
            match inv_map.get(key) {
                Some(inv_value) => plan_value == inv_value,
                None => true,
            }
        }),
        _ => true,
    }
}
