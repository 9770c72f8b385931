// tests/reconciliation_flow.rs
//
// End-to-end reconciliation flow over in-memory records: import-time
// matching, re-match divergence, coordinator resolution, pending counts,
// and orphan repair.

use chrono::NaiveDateTime;
use serde_json::json;

use reconcilia_lib::classifier;
use reconcilia_lib::matching;
use reconcilia_lib::pipeline::reconcile_group;
use reconcilia_lib::workflow::{
    pending_divergence_counts, repair_orphaned_need, resolve_divergence, DivergenceResolution,
};
use reconcilia_lib::{
    CadastroId, ElementGroup, InventoryRecord, LoteId, MatchingConfig, NecessidadeId, NeedRecord,
    ReconciliationContext, RodoviaId, Role, Servico, StatusReconciliacao, TipoMatch,
};

fn ts() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2026, 3, 14)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn scope_ctx(role: Role) -> ReconciliationContext {
    ReconciliationContext {
        lote_id: LoteId("lote-7".to_string()),
        rodovia_id: RodoviaId("sc-401".to_string()),
        actor_id: "coord-ana".to_string(),
        role,
    }
}

fn need(id: &str, grupo: ElementGroup) -> NeedRecord {
    NeedRecord {
        id: NecessidadeId(id.to_string()),
        grupo,
        lote_id: LoteId("lote-7".to_string()),
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
        arquivo_origem: Some("plano_lote7.xlsx".to_string()),
        linha_planilha: Some(12),
        resolvido_por: None,
        resolvido_em: None,
        atualizado_em: None,
    }
}

fn cadastro(id: &str, grupo: ElementGroup) -> InventoryRecord {
    InventoryRecord {
        id: CadastroId(id.to_string()),
        grupo,
        lote_id: LoteId("lote-7".to_string()),
        rodovia_id: RodoviaId("sc-401".to_string()),
        latitude: None,
        longitude: None,
        km_inicial: None,
        km_final: None,
        atributos: json!({}),
        created_at: ts(),
    }
}

#[test]
fn point_scope_matches_classifies_and_survives_reruns() {
    let config = MatchingConfig::default();
    let placas = config.for_group(ElementGroup::Placas).unwrap();

    // Two plan rows: one next to a surveyed sign, one in the open
    let mut near = need("nec-1", ElementGroup::Placas);
    near.latitude = Some(-27.5954);
    near.longitude = Some(-48.5480);
    near.atributos = json!({"material": "aco"});
    let mut alone = need("nec-2", ElementGroup::Placas);
    alone.latitude = Some(-27.7100);
    alone.longitude = Some(-48.7100);
    let mut needs = vec![near, alone];

    let mut surveyed = cadastro("cad-1", ElementGroup::Placas);
    surveyed.latitude = Some(-27.5954);
    surveyed.longitude = Some(-48.5481);
    surveyed.atributos = json!({"material": "aco"});
    let inventory = vec![surveyed];

    let stats = reconcile_group(placas, &mut needs, &inventory, ts());
    assert_eq!(stats.matched, 1);
    assert_eq!(stats.unmatched, 1);

    // Matched row: closest candidate, within threshold, kept as-is
    let matched = &needs[0];
    assert_eq!(matched.cadastro_id, Some(CadastroId("cad-1".to_string())));
    assert_eq!(matched.servico, Some(Servico::Manter));
    let distance = matched.distancia_match_metros.unwrap();
    assert!(distance <= placas.max_distance_meters);
    assert!(distance > 9.0 && distance < 10.5, "distance was {}", distance);

    // Unmatched row: null reference, Implantar
    assert_eq!(needs[1].cadastro_id, None);
    assert_eq!(needs[1].servico, Some(Servico::Implantar));

    // Idempotence over unchanged data
    let snapshot: Vec<_> = needs
        .iter()
        .map(|n| (n.cadastro_id.clone(), n.servico, n.distancia_match_metros))
        .collect();
    reconcile_group(placas, &mut needs, &inventory, ts());
    let rerun: Vec<_> = needs
        .iter()
        .map(|n| (n.cadastro_id.clone(), n.servico, n.distancia_match_metros))
        .collect();
    assert_eq!(snapshot, rerun);
    assert!(needs.iter().all(|n| !n.divergencia));
}

#[test]
fn linear_tiers_follow_overlap_boundaries() {
    let config = MatchingConfig::default();
    let defensas = config.for_group(ElementGroup::Defensas).unwrap();

    let mut exact = need("nec-1", ElementGroup::Defensas);
    exact.km_inicial = Some(10.000);
    exact.km_final = Some(10.500);
    let mut partial = need("nec-2", ElementGroup::Defensas);
    partial.km_inicial = Some(20.000);
    partial.km_final = Some(20.500);
    let mut needs = vec![exact, partial];

    let mut full_cover = cadastro("cad-1", ElementGroup::Defensas);
    full_cover.km_inicial = Some(10.000);
    full_cover.km_final = Some(10.500);
    let mut tail_only = cadastro("cad-2", ElementGroup::Defensas);
    tail_only.km_inicial = Some(20.400);
    tail_only.km_final = Some(20.900);
    let inventory = vec![full_cover, tail_only];

    reconcile_group(defensas, &mut needs, &inventory, ts());

    assert_eq!(needs[0].tipo_match, Some(TipoMatch::Exato));
    assert!((needs[0].overlap_porcentagem.unwrap() - 100.0).abs() < 1e-9);

    assert_eq!(needs[1].tipo_match, Some(TipoMatch::Baixo));
    assert!((needs[1].overlap_porcentagem.unwrap() - 20.0).abs() < 1e-9);

    // With a stricter qualifying minimum the 20% candidate stops matching
    let mut strict = defensas.clone();
    strict.min_overlap_pct = 30.0;
    let mut strict_need = need("nec-3", ElementGroup::Defensas);
    strict_need.km_inicial = Some(20.000);
    strict_need.km_final = Some(20.500);
    let mut strict_needs = vec![strict_need];
    reconcile_group(&strict, &mut strict_needs, &inventory, ts());
    assert_eq!(strict_needs[0].cadastro_id, None);
    assert_eq!(strict_needs[0].servico, Some(Servico::Implantar));
}

#[test]
fn divergence_lifecycle_from_rematch_to_resolution() {
    let config = MatchingConfig::default();
    let placas = config.for_group(ElementGroup::Placas).unwrap();

    // First pass decided Manter; the plan attributes then changed so the
    // re-match computes Substituir.
    let mut row = need("nec-1", ElementGroup::Placas);
    row.latitude = Some(-27.5954);
    row.longitude = Some(-48.5480);
    row.servico = Some(Servico::Manter);
    row.atributos = json!({"material": "aco"});

    let mut surveyed = cadastro("cad-1", ElementGroup::Placas);
    surveyed.latitude = Some(-27.5954);
    surveyed.longitude = Some(-48.5481);
    surveyed.atributos = json!({"material": "madeira"});

    let mut needs = vec![row];
    let inventory = vec![surveyed];
    let stats = reconcile_group(placas, &mut needs, &inventory, ts());

    assert_eq!(stats.divergences_flagged, 1);
    let row = &mut needs[0];
    assert_eq!(row.servico, Some(Servico::Substituir));
    assert!(row.divergencia);
    assert!(!row.reconciliado);
    assert_eq!(row.status_reconciliacao, StatusReconciliacao::DivergentePendente);

    // It shows up in the badge counts until a coordinator acts
    let counts = pending_divergence_counts(needs.iter());
    assert_eq!(counts.values().sum::<usize>(), 1);

    // Coordinator accepts the automatic value
    let ctx = scope_ctx(Role::Coordenador);
    resolve_divergence(
        &mut needs[0],
        DivergenceResolution::AcceptAutomatic,
        &ctx,
        true,
        ts(),
    )
    .unwrap();

    assert!(needs[0].reconciliado);
    assert_eq!(needs[0].status_reconciliacao, StatusReconciliacao::Reconciliado);
    assert_eq!(needs[0].resolvido_por.as_deref(), Some("coord-ana"));
    assert!(pending_divergence_counts(needs.iter()).is_empty());
}

#[test]
fn orphaned_reference_is_repaired_after_external_delete() {
    let mut row = need("nec-1", ElementGroup::Placas);
    row.servico = Some(Servico::Manter);
    row.cadastro_id = Some(CadastroId("cad-gone".to_string()));
    row.divergencia = true;
    row.reconciliado = true;
    row.status_reconciliacao = StatusReconciliacao::Reconciliado;

    assert!(repair_orphaned_need(&mut row, false, true, ts()));

    assert_eq!(row.cadastro_id, None);
    assert_eq!(row.servico, Some(Servico::Implantar));
    assert!(!row.divergencia);
    assert!(!row.reconciliado);
    assert_eq!(row.status_revisao.as_deref(), Some("pendente"));
}

#[test]
fn matcher_invariants_hold_across_a_mixed_candidate_field() {
    // Point mode: the chosen candidate is at least as close as every other
    // in-scope candidate and within the threshold.
    let config = MatchingConfig::default();
    let placas = config.for_group(ElementGroup::Placas).unwrap();

    let mut row = need("nec-1", ElementGroup::Placas);
    row.latitude = Some(-27.5954);
    row.longitude = Some(-48.5480);

    let offsets = [0.0001, 0.0002, 0.0003, 0.0004];
    let inventory: Vec<InventoryRecord> = offsets
        .iter()
        .enumerate()
        .map(|(i, off)| {
            let mut c = cadastro(&format!("cad-{}", i), ElementGroup::Placas);
            c.latitude = Some(-27.5954 + off);
            c.longitude = Some(-48.5480);
            c
        })
        .collect();

    match matching::match_need(&row, &inventory, placas) {
        matching::MatchOutcome::Matched(m) => {
            assert_eq!(m.cadastro_id.0, "cad-0");
            match m.quality {
                matching::MatchQuality::Point { distancia_metros } => {
                    assert!(distancia_metros <= placas.max_distance_meters);
                }
                other => panic!("unexpected quality {:?}", other),
            }
        }
        other => panic!("expected match, got {:?}", other),
    }

    // Attribute comparison drives Manter vs Substituir when the plan has no
    // explicit code
    assert!(classifier::attributes_compatible(
        &json!({"cor": "amarela"}),
        &json!({"cor": "amarela", "largura_cm": 15})
    ));
    assert!(!classifier::attributes_compatible(
        &json!({"cor": "amarela"}),
        &json!({"cor": "branca"})
    ));
}
