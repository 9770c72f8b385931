// src/lib.rs
pub mod classifier;
pub mod config;
pub mod db;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod results;
pub mod workflow;

#[cfg(test)]
pub mod test_fixtures;

// Re-export common types for easier access
pub use models::{
    CadastroId, ElementGroup, InventoryRecord, LoteId, NecessidadeId, NeedRecord,
    ReconciliationContext, RodoviaId, Role, Servico, StatusReconciliacao, TipoMatch,
};

// Re-export important functionality
pub use config::{GroupMatchConfig, MatchGeometry, MatchingConfig};
pub use db::PgPool;
pub use workflow::{DivergenceResolution, PendingDivergenceKey, RepairReport};
