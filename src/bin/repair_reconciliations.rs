// src/bin/repair_reconciliations.rs
//
// Maintenance action: reset reconciliation state on needs whose matched
// cadastro was deleted out-of-band.
//
// Usage: repair_reconciliations <lote_id> <rodovia_id>

use anyhow::{bail, Context, Result};
use log::info;

use reconcilia_lib::{
    config::MatchingConfig,
    db,
    models::{LoteId, ReconciliationContext, RodoviaId, Role},
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("Usage: {} <lote_id> <rodovia_id>", args[0]);
    }

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
    let report = db::repair_orphaned_reconciliations(&pool, &config, &ctx).await?;

    info!(
        "Repair finished: {} records examined, {} repaired",
        report.examined, report.repaired
    );
    Ok(())
}
