// src/main.rs
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;
use std::time::Instant;

use reconcilia_lib::{
    config::MatchingConfig,
    db,
    models::{LoteId, ReconciliationContext, RodoviaId, Role},
    pipeline, results,
};

/// Full reconciliation run for one lote/rodovia scope, normally invoked
/// right after a plan import lands its raw need rows.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    info!("Starting necessidades x cadastro reconciliation pipeline");
    let start_time = Instant::now();

    // Try to load .env file if it exists
    let env_paths = [".env", ".env.local", "../.env"];
    let mut loaded_env = false;

    for path in env_paths.iter() {
        if Path::new(path).exists() {
            if let Err(e) = db::load_env_from_file(path) {
                warn!("Failed to load environment from {}: {}", path, e);
            } else {
                info!("Loaded environment variables from {}", path);
                loaded_env = true;
                break;
            }
        }
    }

    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }

    let ctx = context_from_env()?;
    info!(
        "Scope: lote {}, rodovia {}, actor {}",
        ctx.lote_id.0, ctx.rodovia_id.0, ctx.actor_id
    );

    // Connect to the database
    let pool = db::connect()
        .await
        .context("Failed to connect to database")?;
    info!("Successfully connected to the database");

    let config = MatchingConfig::default();
    let stats = pipeline::run_reconciliation(&pool, &ctx, &config).await?;

    results::log_report(&stats);

    let pending = db::pending_divergence_counts(&pool, &config, &ctx).await?;
    for (key, count) in &pending {
        info!(
            "Pending divergences: {} in {} (lote {}, rodovia {})",
            count,
            key.grupo.as_str(),
            key.lote_id.0,
            key.rodovia_id.0
        );
    }

    info!(
        "Pipeline completed in {:.2?}. Processed {} needs across {} groups ({} failures).",
        start_time.elapsed(),
        stats.total_needs_processed(),
        stats.group_stats.len(),
        stats.failed_groups.len()
    );
    Ok(())
}

/// Builds the call context from RECONCILIA_* environment variables.
fn context_from_env() -> Result<ReconciliationContext> {
    let lote_id = std::env::var("RECONCILIA_LOTE_ID").context("RECONCILIA_LOTE_ID must be set")?;
    let rodovia_id =
        std::env::var("RECONCILIA_RODOVIA_ID").context("RECONCILIA_RODOVIA_ID must be set")?;
    let actor_id =
        std::env::var("RECONCILIA_ACTOR_ID").unwrap_or_else(|_| "pipeline".to_string());

    Ok(ReconciliationContext {
        lote_id: LoteId(lote_id),
        rodovia_id: RodoviaId(rodovia_id),
        actor_id,
        role: Role::Administrador,
    })
}
