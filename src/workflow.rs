// src/workflow.rs

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use log::{info, warn};
use std::collections::HashMap;

use crate::models::{
    CadastroId, ElementGroup, LoteId, NeedRecord, ReconciliationContext, RodoviaId, Servico,
    StatusReconciliacao,
};

/// How a coordinator resolves a pending divergence
#[derive(Debug, Clone, PartialEq)]
pub enum DivergenceResolution {
    /// Accept the automatically computed servico/cadastro as-is
    AcceptAutomatic,

    /// Keep the decision the coordinator had recorded before the re-match
    KeepManualOverride { servico: Servico },

    /// Replace the decision entirely with hand-edited values
    EditManual {
        servico: Servico,
        cadastro_id: Option<CadastroId>,
    },
}

/// Applies a coordinator's resolution to a pending divergence.
///
/// The need leaves the pending queue (`reconciliado = true`); `divergencia`
/// stays true as a historical marker. `referenced_inventory_exists` reports
/// whether the cadastro row the resolution ends up pointing at still exists
/// within the need's lote/rodovia scope: when it does not (deleted, or a
/// hand-edited id from another scope), the reference is nulled out and the
/// servico reverts to Implantar rather than leaving a bad id.
pub fn resolve_divergence(
    need: &mut NeedRecord,
    resolution: DivergenceResolution,
    ctx: &ReconciliationContext,
    referenced_inventory_exists: bool,
    now: NaiveDateTime,
) -> Result<()> {
    if !ctx.role.can_resolve_divergence() {
        bail!(
            "Workflow: role '{}' may not resolve divergences",
            ctx.role.as_str()
        );
    }
    if !need.is_pending_divergence() {
        bail!(
            "Workflow: need {} is not pending (status: {})",
            need.id.0,
            need.status_reconciliacao.as_str()
        );
    }

    match resolution {
        DivergenceResolution::AcceptAutomatic => {
            // The automatic servico/cadastro already sit on the record
        }
        DivergenceResolution::KeepManualOverride { servico } => {
            let kept_reference = need.cadastro_id.clone();
            apply_decision(need, servico, kept_reference)?;
        }
        DivergenceResolution::EditManual {
            servico,
            cadastro_id,
        } => {
            apply_decision(need, servico, cadastro_id)?;
        }
    }

    if need.cadastro_id.is_some() && !referenced_inventory_exists {
        warn!(
            "Workflow: need {} references a deleted cadastro; reverting to Implantar",
            need.id.0
        );
        revert_to_implantar(need, "cadastro referenciado foi removido");
    }

    need.reconciliado = true;
    need.status_reconciliacao = StatusReconciliacao::Reconciliado;
    need.resolvido_por = Some(ctx.actor_id.clone());
    need.resolvido_em = Some(now);

    info!(
        "Workflow: need {} resolved as {} by {}",
        need.id.0,
        need.servico.map(|s| s.as_str()).unwrap_or("-"),
        ctx.actor_id
    );
    Ok(())
}

/// Writes a decided servico/cadastro pair onto the need, enforcing the
/// referential invariants of the data model.
fn apply_decision(
    need: &mut NeedRecord,
    servico: Servico,
    cadastro_id: Option<CadastroId>,
) -> Result<()> {
    match servico {
        Servico::Manter | Servico::Substituir if cadastro_id.is_none() => {
            bail!(
                "Workflow: servico '{}' requires a matched cadastro on need {}",
                servico.as_str(),
                need.id.0
            );
        }
        Servico::Implantar if cadastro_id.is_some() => {
            bail!(
                "Workflow: servico 'implantar' must not reference a cadastro on need {}",
                need.id.0
            );
        }
        _ => {}
    }

    need.servico = Some(servico);
    if need.cadastro_id != cadastro_id {
        // A hand-edited reference invalidates the recorded match quality
        need.distancia_match_metros = None;
        need.overlap_porcentagem = None;
        need.tipo_match = None;
    }
    need.cadastro_id = cadastro_id;
    Ok(())
}

fn revert_to_implantar(need: &mut NeedRecord, motivo: &str) {
    need.cadastro_id = None;
    need.servico = Some(Servico::Implantar);
    need.distancia_match_metros = None;
    need.overlap_porcentagem = None;
    need.tipo_match = None;
    need.status_revisao = Some("pendente".to_string());
    need.motivo_revisao = Some(motivo.to_string());
}

//------------------------------------------------------------------------------
// PENDING COUNTS
//------------------------------------------------------------------------------

/// Aggregation key for divergence badges: one count per scope and group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingDivergenceKey {
    pub lote_id: LoteId,
    pub rodovia_id: RodoviaId,
    pub grupo: ElementGroup,
}

/// Counts pending divergences grouped by {lote, rodovia, group}.
///
/// Resolved records no longer count even though their `divergencia` flag is
/// kept as history.
pub fn pending_divergence_counts<'a, I>(needs: I) -> HashMap<PendingDivergenceKey, usize>
where
    I: IntoIterator<Item = &'a NeedRecord>,
{
    let mut counts = HashMap::new();
    for need in needs {
        if need.is_pending_divergence() {
            let key = PendingDivergenceKey {
                lote_id: need.lote_id.clone(),
                rodovia_id: need.rodovia_id.clone(),
                grupo: need.grupo,
            };
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

//------------------------------------------------------------------------------
// ORPHAN REPAIR
//------------------------------------------------------------------------------

/// Outcome of the "clear orphaned reconciliations" maintenance action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub examined: usize,
    pub repaired: usize,
}

/// Repairs one need left inconsistent by an out-of-band delete.
///
/// A need is orphaned when its cadastro reference no longer resolves, or
/// when its group lost its configuration entry. Repair resets the match and
/// workflow fields and flags the record for review. Returns whether the
/// record was mutated.
pub fn repair_orphaned_need(
    need: &mut NeedRecord,
    inventory_exists: bool,
    group_known: bool,
    now: NaiveDateTime,
) -> bool {
    let dangling_reference = need.cadastro_id.is_some() && !inventory_exists;
    if !dangling_reference && group_known {
        return false;
    }

    if dangling_reference {
        revert_to_implantar(need, "cadastro referenciado nao existe mais");
    } else {
        need.status_revisao = Some("pendente".to_string());
        need.motivo_revisao = Some("grupo sem configuracao de matching".to_string());
    }

    need.divergencia = false;
    need.reconciliado = false;
    need.status_reconciliacao = StatusReconciliacao::SemDivergencia;
    need.atualizado_em = Some(now);
    true
}
