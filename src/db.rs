// src/db.rs

use anyhow::{anyhow, bail, Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_postgres::{Config, NoTls, Row as PgRow};

use crate::config::{GroupMatchConfig, MatchingConfig};
use crate::models::{
    CadastroId, ElementGroup, InventoryRecord, LoteId, NecessidadeId, NeedRecord,
    ReconciliationContext, RodoviaId, Servico, StatusReconciliacao, TipoMatch,
};
use crate::workflow::{
    self, DivergenceResolution, PendingDivergenceKey, RepairReport,
};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

// Size for batched need updates
const BATCH_SIZE: usize = 100;

// Column list shared by every needs table
const NEED_COLUMNS: &str = "id, lote_id, rodovia_id, latitude, longitude, km_inicial, km_final, \
     atributos, plano_servico, servico, cadastro_id, distancia_match_metros, \
     overlap_porcentagem, tipo_match, divergencia, reconciliado, status_reconciliacao, \
     status_revisao, motivo_revisao, arquivo_origem, linha_planilha, resolvido_por, \
     resolvido_em, atualizado_em";

// Column list shared by every inventory table
const INVENTORY_COLUMNS: &str =
    "id, lote_id, rodovia_id, latitude, longitude, km_inicial, km_final, atributos, created_at";

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "supervisao".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("reconcilia_pipeline");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(20)
        .min_idle(Some(2))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    // Test connection
    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    info!("Database connection pool initialized successfully.");
    Ok(pool.clone())
}

/// Loads environment variables from a .env file. Missing file is not an
/// error; existing variables win over file values.
pub fn load_env_from_file(file_path: &str) -> Result<()> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    info!(
        "Attempting to load environment variables from: {}",
        file_path
    );
    match File::open(file_path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line.context("Failed to read line from env file")?;
                if line.starts_with('#') || line.trim().is_empty() {
                    continue;
                }
                if let Some(idx) = line.find('=') {
                    let key = line[..idx].trim();
                    let value = line[idx + 1..].trim().trim_matches('"');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                        debug!(
                            "Set env var from file: {} = {}",
                            key,
                            if key == "POSTGRES_PASSWORD" {
                                "[hidden]"
                            } else {
                                value
                            }
                        );
                    }
                }
            }
            info!("Successfully processed env file: {}", file_path);
        }
        Err(e) => {
            warn!(
                "Could not open env file '{}': {}. Proceeding with system environment variables.",
                file_path, e
            );
        }
    }
    Ok(())
}

//------------------------------------------------------------------------------
// ROW MAPPING
//------------------------------------------------------------------------------

fn row_to_inventory(row: &PgRow, grupo: ElementGroup) -> InventoryRecord {
    InventoryRecord {
        id: CadastroId(row.get("id")),
        grupo,
        lote_id: LoteId(row.get("lote_id")),
        rodovia_id: RodoviaId(row.get("rodovia_id")),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        km_inicial: row.get("km_inicial"),
        km_final: row.get("km_final"),
        atributos: row
            .get::<_, Option<serde_json::Value>>("atributos")
            .unwrap_or(serde_json::Value::Null),
        created_at: row.get("created_at"),
    }
}

fn row_to_need(row: &PgRow, grupo: ElementGroup) -> NeedRecord {
    let servico: Option<String> = row.get("servico");
    let plano_servico: Option<String> = row.get("plano_servico");
    let tipo_match: Option<String> = row.get("tipo_match");
    let status: Option<String> = row.get("status_reconciliacao");

    NeedRecord {
        id: NecessidadeId(row.get("id")),
        grupo,
        lote_id: LoteId(row.get("lote_id")),
        rodovia_id: RodoviaId(row.get("rodovia_id")),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        km_inicial: row.get("km_inicial"),
        km_final: row.get("km_final"),
        atributos: row
            .get::<_, Option<serde_json::Value>>("atributos")
            .unwrap_or(serde_json::Value::Null),
        plano_servico: plano_servico.as_deref().and_then(Servico::from_str),
        servico: servico.as_deref().and_then(Servico::from_str),
        cadastro_id: row.get::<_, Option<String>>("cadastro_id").map(CadastroId),
        distancia_match_metros: row.get("distancia_match_metros"),
        overlap_porcentagem: row.get("overlap_porcentagem"),
        tipo_match: tipo_match.as_deref().and_then(TipoMatch::from_str),
        divergencia: row.get("divergencia"),
        reconciliado: row.get("reconciliado"),
        status_reconciliacao: status
            .as_deref()
            .and_then(StatusReconciliacao::from_str)
            .unwrap_or(StatusReconciliacao::SemDivergencia),
        status_revisao: row.get("status_revisao"),
        motivo_revisao: row.get("motivo_revisao"),
        arquivo_origem: row.get("arquivo_origem"),
        linha_planilha: row.get("linha_planilha"),
        resolvido_por: row.get("resolvido_por"),
        resolvido_em: row.get("resolvido_em"),
        atualizado_em: row.get("atualizado_em"),
    }
}

//------------------------------------------------------------------------------
// SCOPED READS
//------------------------------------------------------------------------------

/// Fetches every inventory record of a group within the context scope.
pub async fn fetch_inventory(
    pool: &PgPool,
    cfg: &GroupMatchConfig,
    ctx: &ReconciliationContext,
) -> Result<Vec<InventoryRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for inventory fetch")?;

    let sql = format!(
        "SELECT {} FROM {} WHERE lote_id = $1 AND rodovia_id = $2 ORDER BY id",
        INVENTORY_COLUMNS, cfg.inventory_table
    );
    let rows = conn
        .query(sql.as_str(), &[&ctx.lote_id.0, &ctx.rodovia_id.0])
        .await
        .with_context(|| format!("Inventory query failed for table {}", cfg.inventory_table))?;

    Ok(rows
        .iter()
        .map(|row| row_to_inventory(row, cfg.grupo))
        .collect())
}

/// Fetches every need record of a group within the context scope.
pub async fn fetch_needs(
    pool: &PgPool,
    cfg: &GroupMatchConfig,
    ctx: &ReconciliationContext,
) -> Result<Vec<NeedRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for needs fetch")?;

    let sql = format!(
        "SELECT {} FROM {} WHERE lote_id = $1 AND rodovia_id = $2 ORDER BY id",
        NEED_COLUMNS, cfg.needs_table
    );
    let rows = conn
        .query(sql.as_str(), &[&ctx.lote_id.0, &ctx.rodovia_id.0])
        .await
        .with_context(|| format!("Needs query failed for table {}", cfg.needs_table))?;

    Ok(rows.iter().map(|row| row_to_need(row, cfg.grupo)).collect())
}

/// Fetches a single need by id, within the context scope.
pub async fn fetch_need(
    pool: &PgPool,
    cfg: &GroupMatchConfig,
    ctx: &ReconciliationContext,
    id: &NecessidadeId,
) -> Result<Option<NeedRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for need fetch")?;

    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND lote_id = $2 AND rodovia_id = $3",
        NEED_COLUMNS, cfg.needs_table
    );
    let row = conn
        .query_opt(sql.as_str(), &[&id.0, &ctx.lote_id.0, &ctx.rodovia_id.0])
        .await
        .with_context(|| format!("Need query failed for table {}", cfg.needs_table))?;

    Ok(row.map(|row| row_to_need(&row, cfg.grupo)))
}

/// Whether a cadastro row exists within the context scope. A row from
/// another lote or rodovia does not count: a need may only reference
/// inventory from its own scope.
pub async fn cadastro_exists(
    pool: &PgPool,
    cfg: &GroupMatchConfig,
    ctx: &ReconciliationContext,
    id: &CadastroId,
) -> Result<bool> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for cadastro existence check")?;

    let sql = format!(
        "SELECT 1 FROM {} WHERE id = $1 AND lote_id = $2 AND rodovia_id = $3",
        cfg.inventory_table
    );
    let row = conn
        .query_opt(sql.as_str(), &[&id.0, &ctx.lote_id.0, &ctx.rodovia_id.0])
        .await
        .with_context(|| format!("Existence check failed for table {}", cfg.inventory_table))?;
    Ok(row.is_some())
}

//------------------------------------------------------------------------------
// MATCH-FIELD WRITES
//------------------------------------------------------------------------------

/// Persists recomputed match and workflow fields for a set of needs.
///
/// Writes run in batched transactions; a failed batch is rolled back and
/// counted, but earlier batches stay committed. Returns the number of
/// records written.
pub async fn update_need_match_fields(
    pool: &PgPool,
    cfg: &GroupMatchConfig,
    needs: &[NeedRecord],
) -> Result<usize> {
    if needs.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "UPDATE {} SET \
             servico = $2, cadastro_id = $3, distancia_match_metros = $4, \
             overlap_porcentagem = $5, tipo_match = $6, divergencia = $7, \
             reconciliado = $8, status_reconciliacao = $9, status_revisao = $10, \
             motivo_revisao = $11, resolvido_por = $12, resolvido_em = $13, \
             atualizado_em = $14 \
         WHERE id = $1",
        cfg.needs_table
    );

    let mut written = 0usize;
    let mut failed_batches = 0usize;

    for chunk in needs.chunks(BATCH_SIZE) {
        match write_need_batch(pool, &sql, chunk).await {
            Ok(count) => written += count,
            Err(e) => {
                failed_batches += 1;
                warn!(
                    "Batch update failed for table {} ({} records): {:#}",
                    cfg.needs_table,
                    chunk.len(),
                    e
                );
            }
        }
    }

    if failed_batches > 0 {
        if written == 0 {
            bail!(
                "All batch updates failed for table {} ({} batches)",
                cfg.needs_table,
                failed_batches
            );
        }
        warn!(
            "Table {}: {} records written, {} batches failed",
            cfg.needs_table, written, failed_batches
        );
    }
    Ok(written)
}

async fn write_need_batch(pool: &PgPool, sql: &str, chunk: &[NeedRecord]) -> Result<usize> {
    let mut conn = pool
        .get()
        .await
        .context("Failed to get DB connection for batch need update")?;
    let tx = conn
        .transaction()
        .await
        .context("Failed to start transaction for batch need update")?;

    let mut count = 0usize;
    for need in chunk {
        let servico = need.servico.map(|s| s.as_str());
        let tipo_match = need.tipo_match.map(|t| t.as_str());
        let rows = tx
            .execute(
                sql,
                &[
                    &need.id.0,
                    &servico,
                    &need.cadastro_id,
                    &need.distancia_match_metros,
                    &need.overlap_porcentagem,
                    &tipo_match,
                    &need.divergencia,
                    &need.reconciliado,
                    &need.status_reconciliacao.as_str(),
                    &need.status_revisao,
                    &need.motivo_revisao,
                    &need.resolvido_por,
                    &need.resolvido_em,
                    &need.atualizado_em,
                ],
            )
            .await
            .with_context(|| format!("Failed to update need {}", need.id.0))?;
        count += rows as usize;
    }

    tx.commit()
        .await
        .context("Failed to commit batch need update")?;
    Ok(count)
}

//------------------------------------------------------------------------------
// WORKFLOW ENTRY POINTS
//------------------------------------------------------------------------------

/// Applies a coordinator resolution to one need and persists it.
///
/// The cadastro reference the resolution ends up pointing at is re-checked
/// against the inventory table within the context scope inside this call, so
/// neither an out-of-band delete nor a hand-edited id from another lote or
/// rodovia can leave a bad reference behind.
pub async fn resolve_divergence(
    pool: &PgPool,
    config: &MatchingConfig,
    ctx: &ReconciliationContext,
    grupo: ElementGroup,
    need_id: &NecessidadeId,
    resolution: DivergenceResolution,
) -> Result<NeedRecord> {
    let cfg = config.for_group(grupo)?;

    let mut need = fetch_need(pool, cfg, ctx, need_id)
        .await?
        .ok_or_else(|| {
            anyhow!(
                "Need {} not found in {} for lote {}, rodovia {}",
                need_id.0,
                cfg.needs_table,
                ctx.lote_id.0,
                ctx.rodovia_id.0
            )
        })?;

    // The reference that will survive the resolution
    let referenced = match &resolution {
        DivergenceResolution::EditManual { cadastro_id, .. } => cadastro_id.clone(),
        _ => need.cadastro_id.clone(),
    };
    let referenced_inventory_exists = match &referenced {
        Some(id) => cadastro_exists(pool, cfg, ctx, id).await?,
        None => true,
    };

    let now = Utc::now().naive_utc();
    workflow::resolve_divergence(&mut need, resolution, ctx, referenced_inventory_exists, now)?;

    let written = update_need_match_fields(pool, cfg, std::slice::from_ref(&need)).await?;
    if written == 0 {
        bail!(
            "Resolution write for need {} affected no rows (deleted concurrently?)",
            need.id.0
        );
    }
    Ok(need)
}

/// Counts pending divergences per {lote, rodovia, group} for the badge/
/// dashboard read path. Callers poll this on an interval; staleness is
/// acceptable.
pub async fn pending_divergence_counts(
    pool: &PgPool,
    config: &MatchingConfig,
    ctx: &ReconciliationContext,
) -> Result<HashMap<PendingDivergenceKey, usize>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for pending divergence counts")?;

    let mut counts = HashMap::new();
    for cfg in config.configured_groups() {
        let sql = format!(
            "SELECT COUNT(*) AS pending FROM {} \
             WHERE lote_id = $1 AND rodovia_id = $2 AND divergencia AND NOT reconciliado",
            cfg.needs_table
        );
        let row = conn
            .query_one(sql.as_str(), &[&ctx.lote_id.0, &ctx.rodovia_id.0])
            .await
            .with_context(|| format!("Pending count query failed for {}", cfg.needs_table))?;
        let pending: i64 = row.get("pending");
        if pending > 0 {
            counts.insert(
                PendingDivergenceKey {
                    lote_id: ctx.lote_id.clone(),
                    rodovia_id: ctx.rodovia_id.clone(),
                    grupo: cfg.grupo,
                },
                pending as usize,
            );
        }
    }
    Ok(counts)
}

/// Maintenance action: clears reconciliation state left behind by
/// out-of-band cadastro deletes. Administrator only.
pub async fn repair_orphaned_reconciliations(
    pool: &PgPool,
    config: &MatchingConfig,
    ctx: &ReconciliationContext,
) -> Result<RepairReport> {
    if !ctx.role.can_administer() {
        bail!(
            "Repair requires an administrator role (actor {} is {})",
            ctx.actor_id,
            ctx.role.as_str()
        );
    }

    let now = Utc::now().naive_utc();
    let mut report = RepairReport::default();

    for cfg in config.configured_groups() {
        let inventory_ids: HashSet<CadastroId> = fetch_inventory(pool, cfg, ctx)
            .await?
            .into_iter()
            .map(|inv| inv.id)
            .collect();
        let mut needs = fetch_needs(pool, cfg, ctx).await?;

        let mut repaired: Vec<NeedRecord> = Vec::new();
        for need in needs.iter_mut() {
            report.examined += 1;
            let exists = need
                .cadastro_id
                .as_ref()
                .map(|id| inventory_ids.contains(id))
                .unwrap_or(true);
            if workflow::repair_orphaned_need(need, exists, config.knows_group(need.grupo), now) {
                repaired.push(need.clone());
            }
        }

        if !repaired.is_empty() {
            let written = update_need_match_fields(pool, cfg, &repaired).await?;
            report.repaired += written;
            info!(
                "Repair: {} orphaned needs reset in {}",
                written, cfg.needs_table
            );
        }
    }

    info!(
        "Repair complete: {} examined, {} repaired (lote {}, rodovia {})",
        report.examined, report.repaired, ctx.lote_id.0, ctx.rodovia_id.0
    );
    Ok(report)
}
