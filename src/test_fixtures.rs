// src/test_fixtures.rs
//
// Record builders shared by the unit tests. All fixtures live in the same
// lote/rodovia scope unless a test moves them.

use chrono::NaiveDateTime;
use serde_json::json;

use crate::models::{
    CadastroId, ElementGroup, InventoryRecord, LoteId, NecessidadeId, NeedRecord,
    ReconciliationContext, RodoviaId, Role, StatusReconciliacao,
};

pub fn now() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2026, 3, 14)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn context(role: Role) -> ReconciliationContext {
    let actor_id = match role {
        Role::Tecnico => "tec-1",
        Role::Coordenador => "coord-1",
        Role::Administrador => "admin-1",
    };
    ReconciliationContext {
        lote_id: LoteId("lote-1".to_string()),
        rodovia_id: RodoviaId("sc-401".to_string()),
        actor_id: actor_id.to_string(),
        role,
    }
}

fn base_need(id: &str, grupo: ElementGroup) -> NeedRecord {
    NeedRecord {
        id: NecessidadeId(id.to_string()),
        grupo,
        lote_id: LoteId("lote-1".to_string()),
        rodovia_id: RodoviaId("sc-401".to_string()),
        latitude: None,
        longitude: None,
        km_inicial: None,
        km_final: None,
        atributos: json!({}),
        plano_servico: None,
        servico: None,
        cadastro_id: None,
        distancia_match_metros: None,
        overlap_porcentagem: None,
        tipo_match: None,
        divergencia: false,
        reconciliado: false,
        status_reconciliacao: StatusReconciliacao::SemDivergencia,
        status_revisao: None,
        motivo_revisao: None,
        arquivo_origem: Some("plano_2026.xlsx".to_string()),
        linha_planilha: Some(1),
        resolvido_por: None,
        resolvido_em: None,
        atualizado_em: None,
    }
}

fn base_inventory(id: &str, grupo: ElementGroup) -> InventoryRecord {
    InventoryRecord {
        id: CadastroId(id.to_string()),
        grupo,
        lote_id: LoteId("lote-1".to_string()),
        rodovia_id: RodoviaId("sc-401".to_string()),
        latitude: None,
        longitude: None,
        km_inicial: None,
        km_final: None,
        atributos: json!({}),
        created_at: now(),
    }
}

pub fn need_point(id: &str, lat: f64, lon: f64) -> NeedRecord {
    let mut need = base_need(id, ElementGroup::Placas);
    need.latitude = Some(lat);
    need.longitude = Some(lon);
    need
}

pub fn need_linear(id: &str, km_inicial: f64, km_final: f64) -> NeedRecord {
    let mut need = base_need(id, ElementGroup::Defensas);
    need.km_inicial = Some(km_inicial);
    need.km_final = Some(km_final);
    need
}

pub fn inventory_point(id: &str, lat: f64, lon: f64) -> InventoryRecord {
    let mut inv = base_inventory(id, ElementGroup::Placas);
    inv.latitude = Some(lat);
    inv.longitude = Some(lon);
    inv
}

pub fn inventory_linear(id: &str, km_inicial: f64, km_final: f64) -> InventoryRecord {
    let mut inv = base_inventory(id, ElementGroup::Defensas);
    inv.km_inicial = Some(km_inicial);
    inv.km_final = Some(km_final);
    inv
}
