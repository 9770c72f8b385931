// src/bin/recalculate_matches.rs
//
// Admin action: re-run matching for an existing lote/rodovia scope.
//
// Usage: recalculate_matches <lote_id> <rodovia_id> [grupo]

use anyhow::{bail, Context, Result};
use log::info;

use reconcilia_lib::{
    config::MatchingConfig,
    db,
    models::{ElementGroup, LoteId, ReconciliationContext, RodoviaId, Role},
    pipeline, results,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("Usage: {} <lote_id> <rodovia_id> [grupo]", args[0]);
    }

    let only_group = match args.get(3) {
        Some(name) => match ElementGroup::from_str(name) {
            Some(grupo) => Some(grupo),
            None => bail!("Unknown element group '{}'", name),
        },
        None => None,
    };

    let ctx = ReconciliationContext {
        lote_id: LoteId(args[1].clone()),
        rodovia_id: RodoviaId(args[2].clone()),
        actor_id: std::env::var("RECONCILIA_ACTOR_ID").unwrap_or_else(|_| "admin-cli".to_string()),
        role: Role::Administrador,
    };

    if let Err(e) = db::load_env_from_file(".env") {
        info!("Env file skipped: {}", e);
    }
    let pool = db::connect()
        .await
        .context("Failed to connect to database")?;

    let config = MatchingConfig::default();
    let stats = pipeline::run_recalculation(&pool, &ctx, &config, only_group).await?;
    results::log_report(&stats);

    if !stats.failed_groups.is_empty() {
        bail!(
            "{} group(s) failed; completed groups were not rolled back",
            stats.failed_groups.len()
        );
    }
    Ok(())
}
