// src/pipeline.rs

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::classifier::{apply_classification, classify};
use crate::config::{GroupMatchConfig, MatchingConfig};
use crate::db::{self, PgPool};
use crate::matching::{self, MatchOutcome, MatchQuality};
use crate::models::{
    CadastroId, ElementGroup, InventoryRecord, NeedRecord, ReconciliationContext,
};
use crate::results::{GroupMatchStats, ReconRunStats};

/// Matches and classifies every need of one group against the current
/// inventory set.
///
/// Pure with respect to storage: the caller supplies the records and
/// persists the mutated needs. Each need's outcome depends only on its own
/// geometry and the inventory slice, so iteration order never changes
/// results.
pub fn reconcile_group(
    cfg: &GroupMatchConfig,
    needs: &mut [NeedRecord],
    inventory: &[InventoryRecord],
    now: chrono::NaiveDateTime,
) -> GroupMatchStats {
    let by_id: HashMap<&CadastroId, &InventoryRecord> =
        inventory.iter().map(|inv| (&inv.id, inv)).collect();

    let mut stats = GroupMatchStats::empty(cfg.grupo);
    let mut distances: Vec<f64> = Vec::new();
    let mut overlaps: Vec<f64> = Vec::new();

    for need in needs.iter_mut() {
        stats.needs_processed += 1;

        let outcome = matching::match_need(need, inventory, cfg);
        let matched_inventory = match &outcome {
            MatchOutcome::Matched(m) => by_id.get(&m.cadastro_id).copied(),
            _ => None,
        };

        match &outcome {
            MatchOutcome::Matched(m) => {
                stats.matched += 1;
                match &m.quality {
                    MatchQuality::Point { distancia_metros } => distances.push(*distancia_metros),
                    MatchQuality::Linear {
                        overlap_porcentagem, ..
                    } => overlaps.push(*overlap_porcentagem),
                }
            }
            MatchOutcome::Unmatched => stats.unmatched += 1,
            MatchOutcome::SkippedMissingGeometry { .. } => stats.skipped_missing_geometry += 1,
        }

        let classification = classify(need, &outcome, matched_inventory);
        apply_classification(need, classification, now);

        if need.is_pending_divergence() {
            stats.divergences_flagged += 1;
        }
    }

    if !distances.is_empty() {
        stats.avg_distance_meters = Some(distances.iter().sum::<f64>() / distances.len() as f64);
    }
    if !overlaps.is_empty() {
        stats.avg_overlap_pct = Some(overlaps.iter().sum::<f64>() / overlaps.len() as f64);
    }
    stats
}

/// Runs matching and classification for every configured group in the
/// context's lote/rodovia scope, persisting the recomputed match fields.
///
/// A group failure (configuration or backend) is recorded and the remaining
/// groups continue independently; already-persisted groups are not rolled
/// back.
pub async fn run_reconciliation(
    pool: &PgPool,
    ctx: &ReconciliationContext,
    cfg: &MatchingConfig,
) -> Result<ReconRunStats> {
    let run_id = Uuid::new_v4().to_string();
    let start_time = Instant::now();
    info!(
        "Reconciliation run {} starting (lote {}, rodovia {}, actor {})",
        run_id, ctx.lote_id.0, ctx.rodovia_id.0, ctx.actor_id
    );

    let mut stats = ReconRunStats {
        run_id: run_id.clone(),
        run_timestamp: Utc::now().naive_utc(),
        lote_id: ctx.lote_id.clone(),
        rodovia_id: ctx.rodovia_id.clone(),
        group_stats: Vec::new(),
        failed_groups: Vec::new(),
        matching_time: 0.0,
        total_processing_time: 0.0,
    };

    // Group runs touch disjoint table pairs and needs are independent, so
    // the per-group futures can run concurrently
    let matching_start = Instant::now();
    let group_cfgs: Vec<&GroupMatchConfig> = cfg.configured_groups().collect();
    let outcomes = join_all(
        group_cfgs
            .iter()
            .map(|group_cfg| run_group(pool, ctx, group_cfg)),
    )
    .await;

    for (group_cfg, outcome) in group_cfgs.iter().zip(outcomes) {
        match outcome {
            Ok(group_stats) => stats.group_stats.push(group_stats),
            Err(e) => {
                warn!(
                    "Run {}: group {} failed: {:#}",
                    run_id,
                    group_cfg.grupo.as_str(),
                    e
                );
                stats
                    .failed_groups
                    .push((group_cfg.grupo, format!("{:#}", e)));
            }
        }
    }
    stats.matching_time = matching_start.elapsed().as_secs_f64();
    stats.total_processing_time = start_time.elapsed().as_secs_f64();

    info!(
        "Reconciliation run {} complete in {:.2?}: {} needs, {} matched, {} divergences, {} group failures",
        run_id,
        start_time.elapsed(),
        stats.total_needs_processed(),
        stats.total_matched(),
        stats.total_divergences(),
        stats.failed_groups.len()
    );
    Ok(stats)
}

/// Admin "recalculate matches" action: re-runs matching for an existing
/// scope, optionally restricted to a single group.
pub async fn run_recalculation(
    pool: &PgPool,
    ctx: &ReconciliationContext,
    cfg: &MatchingConfig,
    only_group: Option<ElementGroup>,
) -> Result<ReconRunStats> {
    if !ctx.role.can_administer() {
        bail!(
            "Recalculation requires an administrator role (actor {} is {})",
            ctx.actor_id,
            ctx.role.as_str()
        );
    }

    match only_group {
        Some(grupo) => {
            // Fail fast if the requested group has no configuration
            cfg.for_group(grupo)?;
            let restricted = restrict_to_group(cfg, grupo);
            run_reconciliation(pool, ctx, &restricted).await
        }
        None => run_reconciliation(pool, ctx, cfg).await,
    }
}

fn restrict_to_group(cfg: &MatchingConfig, grupo: ElementGroup) -> MatchingConfig {
    let mut restricted = cfg.clone();
    for other in ElementGroup::all() {
        if other != grupo {
            restricted = restricted.without_group(other);
        }
    }
    restricted
}

async fn run_group(
    pool: &PgPool,
    ctx: &ReconciliationContext,
    group_cfg: &GroupMatchConfig,
) -> Result<GroupMatchStats> {
    let inventory = db::fetch_inventory(pool, group_cfg, ctx).await?;
    let mut needs = db::fetch_needs(pool, group_cfg, ctx).await?;
    info!(
        "Group {}: {} needs against {} inventory records",
        group_cfg.grupo.as_str(),
        needs.len(),
        inventory.len()
    );

    let now = Utc::now().naive_utc();
    let mut stats = reconcile_group(group_cfg, &mut needs, &inventory, now);

    // A partially failed persist must show in the report, not only in logs
    let written = db::update_need_match_fields(pool, group_cfg, &needs).await?;
    stats.records_written = written;
    stats.failed_writes = needs.len().saturating_sub(written);
    if stats.failed_writes > 0 {
        warn!(
            "Group {}: {} of {} recomputed needs were not persisted",
            group_cfg.grupo.as_str(),
            stats.failed_writes,
            needs.len()
        );
    }
    Ok(stats)
}
