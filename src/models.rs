// src/models.rs

use bytes::BytesMut;
use chrono::NaiveDateTime;
use postgres_types::{FromSql, IsNull, ToSql, Type};
use serde::{Deserialize, Serialize};
use std::error::Error;

//------------------------------------------------------------------------------
// IDENTIFIER TYPES
//------------------------------------------------------------------------------
// Using newtype pattern for type safety to prevent mixing different ID types

/// Strongly typed identifier for InventoryRecord (cadastro) rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CadastroId(pub String);

// Implement ToSql for CadastroId so it can be bound directly in queries
impl ToSql for CadastroId {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        // Delegate to the implementation for String
        self.0.to_sql(ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        <String as ToSql>::accepts(ty)
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.0.to_sql_checked(ty, out)
    }
}

impl<'a> FromSql<'a> for CadastroId {
    fn from_sql(ty: &Type, raw: &[u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let s = String::from_sql(ty, raw)?;
        Ok(CadastroId(s))
    }

    fn accepts(ty: &Type) -> bool {
        <String as FromSql>::accepts(ty)
    }
}

/// Strongly typed identifier for NeedRecord (necessidade) rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NecessidadeId(pub String);

/// Strongly typed identifier for a work lot (contract scope)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoteId(pub String);

/// Strongly typed identifier for a highway within a lote
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RodoviaId(pub String);

//------------------------------------------------------------------------------
// ENUMERATIONS
//------------------------------------------------------------------------------

/// Enum for the element categories handled by the reconciliation core
///
/// The group determines which matching geometry applies and which
/// inventory/needs table pair backs the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementGroup {
    /// Traffic signs (point geometry)
    Placas,

    /// Guardrails (linear geometry)
    Defensas,

    /// Longitudinal pavement markings (linear geometry)
    MarcasLongitudinais,

    /// Overhead gantries (point geometry)
    Porticos,

    /// Transversal markings and pavement inscriptions (linear geometry)
    Inscricoes,

    /// Delineator cylinders (point geometry)
    Cilindros,

    /// Raised pavement markers (linear geometry)
    Tachas,
}

impl ElementGroup {
    /// Converts the enum to its canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placas => "placas",
            Self::Defensas => "defensas",
            Self::MarcasLongitudinais => "marcas_longitudinais",
            Self::Porticos => "porticos",
            Self::Inscricoes => "inscricoes",
            Self::Cilindros => "cilindros",
            Self::Tachas => "tachas",
        }
    }

    /// Creates the enum from a string representation, if known
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "placas" => Some(Self::Placas),
            "defensas" => Some(Self::Defensas),
            "marcas_longitudinais" => Some(Self::MarcasLongitudinais),
            "porticos" => Some(Self::Porticos),
            "inscricoes" | "marcas_transversais" => Some(Self::Inscricoes),
            "cilindros" => Some(Self::Cilindros),
            "tachas" => Some(Self::Tachas),
            _ => None,
        }
    }

    /// All groups, in the order runs iterate over them
    pub fn all() -> [ElementGroup; 7] {
        [
            Self::Placas,
            Self::Defensas,
            Self::MarcasLongitudinais,
            Self::Porticos,
            Self::Inscricoes,
            Self::Cilindros,
            Self::Tachas,
        ]
    }
}

/// Enum for the four service actions a need can be classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Servico {
    /// Nothing matched in the field; the element must be installed
    Implantar,

    /// A matched element exists but must be replaced
    Substituir,

    /// A matched element must be removed with no replacement
    Remover,

    /// A matched element stays as-is
    Manter,
}

impl Servico {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implantar => "implantar",
            Self::Substituir => "substituir",
            Self::Remover => "remover",
            Self::Manter => "manter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "implantar" => Some(Self::Implantar),
            "substituir" => Some(Self::Substituir),
            "remover" => Some(Self::Remover),
            "manter" => Some(Self::Manter),
            _ => None,
        }
    }
}

/// Enum for linear-match quality tiers
///
/// Tier boundaries are configuration (see `config::GroupMatchConfig`); the
/// enum only names the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TipoMatch {
    /// ~100% overlap within tolerance
    Exato,

    /// Overlap at or above the high cutoff
    Alto,

    /// Overlap at or above the medium cutoff
    Medio,

    /// Any qualifying overlap below the medium cutoff
    Baixo,
}

impl TipoMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exato => "exato",
            Self::Alto => "alto",
            Self::Medio => "medio",
            Self::Baixo => "baixo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exato" => Some(Self::Exato),
            "alto" => Some(Self::Alto),
            "medio" | "médio" => Some(Self::Medio),
            "baixo" => Some(Self::Baixo),
            _ => None,
        }
    }
}

/// Enum for the divergence workflow state of a need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusReconciliacao {
    /// Automatic classification agrees with any stored decision
    SemDivergencia,

    /// Automatic classification disagrees with a stored decision; awaiting a
    /// coordinator
    DivergentePendente,

    /// A coordinator resolved the divergence; terminal until the next re-match
    Reconciliado,
}

impl StatusReconciliacao {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemDivergencia => "sem_divergencia",
            Self::DivergentePendente => "divergente_pendente",
            Self::Reconciliado => "reconciliado",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sem_divergencia" => Some(Self::SemDivergencia),
            "divergente_pendente" => Some(Self::DivergentePendente),
            "reconciliado" => Some(Self::Reconciliado),
            _ => None,
        }
    }
}

/// Enum for actor roles recognized by the reconciliation core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Field technician: creates inventory, never mutates needs directly
    Tecnico,

    /// Coordinator: reviews and resolves divergences
    Coordenador,

    /// Administrator: recalculation and maintenance/repair actions
    Administrador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tecnico => "tecnico",
            Self::Coordenador => "coordenador",
            Self::Administrador => "administrador",
        }
    }

    /// Whether this role may resolve pending divergences
    pub fn can_resolve_divergence(&self) -> bool {
        matches!(self, Self::Coordenador | Self::Administrador)
    }

    /// Whether this role may run recalculation and repair actions
    pub fn can_administer(&self) -> bool {
        matches!(self, Self::Administrador)
    }
}

//------------------------------------------------------------------------------
// CORE DOMAIN MODELS
//------------------------------------------------------------------------------

/// A field-surveyed physical element (cadastro row)
///
/// Created by field technicians; the reconciliation core only ever reads
/// these. Location is either a single GPS point or a linear km range,
/// depending on the element group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Unique identifier for this cadastro row
    pub id: CadastroId,

    /// Element category this record belongs to
    pub grupo: ElementGroup,

    /// Contract lot scoping this record
    pub lote_id: LoteId,

    /// Highway scoping this record
    pub rodovia_id: RodoviaId,

    /// GPS latitude, for point-geometry groups
    pub latitude: Option<f64>,

    /// GPS longitude, for point-geometry groups
    pub longitude: Option<f64>,

    /// Start kilometer, for linear-geometry groups
    pub km_inicial: Option<f64>,

    /// End kilometer, for linear-geometry groups
    pub km_final: Option<f64>,

    /// Group-specific attributes (material, dimensions, color, ...) as a
    /// JSON object, mirroring the per-group table columns
    pub atributos: serde_json::Value,

    /// When this record was surveyed/created
    pub created_at: NaiveDateTime,
}

/// A plan-derived record requiring reconciliation against inventory
/// (necessidade row)
///
/// Created at plan-import time; match fields are owned by the matcher and
/// classifier, workflow fields by the approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedRecord {
    /// Unique identifier for this necessidade row
    pub id: NecessidadeId,

    /// Element category this record belongs to
    pub grupo: ElementGroup,

    /// Contract lot scoping this record
    pub lote_id: LoteId,

    /// Highway scoping this record
    pub rodovia_id: RodoviaId,

    /// GPS latitude, for point-geometry groups
    pub latitude: Option<f64>,

    /// GPS longitude, for point-geometry groups
    pub longitude: Option<f64>,

    /// Start kilometer, for linear-geometry groups
    pub km_inicial: Option<f64>,

    /// End kilometer, for linear-geometry groups
    pub km_final: Option<f64>,

    /// Group-specific attributes from the project plan, same shape as the
    /// cadastro side
    pub atributos: serde_json::Value,

    /// Service action explicitly carried by the project plan, when present.
    /// `Some(Remover)` marks removal with no replacement; `Some(Substituir)`
    /// forces replacement of whatever matches.
    pub plano_servico: Option<Servico>,

    /// The computed or decided service action. `None` only before the first
    /// matching run.
    pub servico: Option<Servico>,

    /// Matched cadastro row, when a candidate qualified
    pub cadastro_id: Option<CadastroId>,

    /// Distance to the matched candidate, point-geometry groups only
    pub distancia_match_metros: Option<f64>,

    /// Overlap of the matched candidate over the need length, linear groups
    /// only
    pub overlap_porcentagem: Option<f64>,

    /// Quality tier of the linear match
    pub tipo_match: Option<TipoMatch>,

    /// True when the automatic classification disagrees with a previously
    /// stored decision. Only meaningful while `reconciliado` is false; kept
    /// as a historical marker after resolution.
    pub divergencia: bool,

    /// True once a coordinator resolved the divergence
    pub reconciliado: bool,

    /// Workflow state derived from the two flags above
    pub status_reconciliacao: StatusReconciliacao,

    /// Free-form review flag for manual follow-up (e.g. "pendente")
    pub status_revisao: Option<String>,

    /// Why the record was flagged for review
    pub motivo_revisao: Option<String>,

    /// Import provenance: source spreadsheet file
    pub arquivo_origem: Option<String>,

    /// Import provenance: row number within the source spreadsheet
    pub linha_planilha: Option<i32>,

    /// Actor who resolved the last divergence, if any
    pub resolvido_por: Option<String>,

    /// When the last divergence was resolved
    pub resolvido_em: Option<NaiveDateTime>,

    /// When match fields were last recomputed
    pub atualizado_em: Option<NaiveDateTime>,
}

impl NeedRecord {
    /// Whether this need is waiting on a coordinator decision
    pub fn is_pending_divergence(&self) -> bool {
        self.divergencia && !self.reconciliado
    }
}

/// Explicit call context for every matcher/workflow entry point
///
/// Replaces the ambient session state of the original UI: the scope being
/// operated on and the actor performing the operation travel with the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationContext {
    pub lote_id: LoteId,
    pub rodovia_id: RodoviaId,
    pub actor_id: String,
    pub role: Role,
}
