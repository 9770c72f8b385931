// src/config.rs

use anyhow::{anyhow, Result};

use crate::models::ElementGroup;

// Default thresholds. These are tunable parameters, not invariants; callers
// may replace any of them through MatchingConfig before a run.
pub const DEFAULT_POINT_MAX_DISTANCE_METERS: f64 = 50.0;
pub const DEFAULT_POINT_TIE_EPSILON_METERS: f64 = 0.5;
pub const DEFAULT_MIN_OVERLAP_PCT: f64 = 0.0;
pub const DEFAULT_EXACT_OVERLAP_TOLERANCE_PCT: f64 = 0.5;
pub const DEFAULT_HIGH_OVERLAP_CUTOFF_PCT: f64 = 70.0;
pub const DEFAULT_MEDIUM_OVERLAP_CUTOFF_PCT: f64 = 30.0;

/// Which geometry the candidate matcher uses for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchGeometry {
    /// Single GPS point per record; match by great-circle distance
    Point,

    /// [km_inicial, km_final] range per record; match by overlap percentage
    Linear,
}

/// Static matching configuration for one element group
#[derive(Debug, Clone)]
pub struct GroupMatchConfig {
    pub grupo: ElementGroup,
    pub geometry: MatchGeometry,

    /// Inventory (cadastro) table backing this group
    pub inventory_table: &'static str,

    /// Needs (necessidade) table backing this group
    pub needs_table: &'static str,

    /// Point mode: a candidate qualifies only within this distance
    pub max_distance_meters: f64,

    /// Point mode: distances within this epsilon are treated as tied and
    /// broken by smallest cadastro id
    pub tie_epsilon_meters: f64,

    /// Linear mode: minimum overlap percentage for a candidate to qualify.
    /// 0.0 means any positive overlap qualifies.
    pub min_overlap_pct: f64,

    /// Linear mode: overlap within this tolerance of 100% classifies as
    /// "exato"
    pub exact_overlap_tolerance_pct: f64,

    /// Linear mode: cutoff for the "alto" tier
    pub high_overlap_cutoff_pct: f64,

    /// Linear mode: cutoff for the "medio" tier
    pub medium_overlap_cutoff_pct: f64,
}

impl GroupMatchConfig {
    fn new(
        grupo: ElementGroup,
        geometry: MatchGeometry,
        inventory_table: &'static str,
        needs_table: &'static str,
    ) -> Self {
        Self {
            grupo,
            geometry,
            inventory_table,
            needs_table,
            max_distance_meters: DEFAULT_POINT_MAX_DISTANCE_METERS,
            tie_epsilon_meters: DEFAULT_POINT_TIE_EPSILON_METERS,
            min_overlap_pct: DEFAULT_MIN_OVERLAP_PCT,
            exact_overlap_tolerance_pct: DEFAULT_EXACT_OVERLAP_TOLERANCE_PCT,
            high_overlap_cutoff_pct: DEFAULT_HIGH_OVERLAP_CUTOFF_PCT,
            medium_overlap_cutoff_pct: DEFAULT_MEDIUM_OVERLAP_CUTOFF_PCT,
        }
    }
}

/// Exhaustive mapping from element group to its matching configuration
///
/// Replaces the runtime table-name string dispatch of the original system
/// with a typed mapping resolved at construction time.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    groups: Vec<GroupMatchConfig>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        use ElementGroup::*;
        use MatchGeometry::*;
        Self {
            groups: vec![
                GroupMatchConfig::new(Placas, Point, "cadastro_placas", "necessidades_placas"),
                GroupMatchConfig::new(Defensas, Linear, "cadastro_defensas", "necessidades_defensas"),
                GroupMatchConfig::new(
                    MarcasLongitudinais,
                    Linear,
                    "cadastro_marcas_longitudinais",
                    "necessidades_marcas_longitudinais",
                ),
                GroupMatchConfig::new(Porticos, Point, "cadastro_porticos", "necessidades_porticos"),
                GroupMatchConfig::new(
                    Inscricoes,
                    Linear,
                    "cadastro_inscricoes",
                    "necessidades_inscricoes",
                ),
                GroupMatchConfig::new(Cilindros, Point, "cadastro_cilindros", "necessidades_cilindros"),
                GroupMatchConfig::new(Tachas, Linear, "cadastro_tachas", "necessidades_tachas"),
            ],
        }
    }
}

impl MatchingConfig {
    /// Looks up the configuration for a group.
    ///
    /// A missing entry is a configuration error: it aborts that group's run
    /// but not the whole pipeline.
    pub fn for_group(&self, grupo: ElementGroup) -> Result<&GroupMatchConfig> {
        self.groups
            .iter()
            .find(|g| g.grupo == grupo)
            .ok_or_else(|| anyhow!("No matching configuration for group '{}'", grupo.as_str()))
    }

    /// Whether a group has a configuration entry (used by the repair action)
    pub fn knows_group(&self, grupo: ElementGroup) -> bool {
        self.groups.iter().any(|g| g.grupo == grupo)
    }

    /// All configured groups, in run order
    pub fn configured_groups(&self) -> impl Iterator<Item = &GroupMatchConfig> {
        self.groups.iter()
    }

    /// Replaces the entry for a group, for callers tuning thresholds
    pub fn set_group(&mut self, cfg: GroupMatchConfig) {
        if let Some(existing) = self.groups.iter_mut().find(|g| g.grupo == cfg.grupo) {
            *existing = cfg;
        } else {
            self.groups.push(cfg);
        }
    }

    /// A configuration with the given group removed, for tests and for
    /// callers restricting a recalculation to a subset of groups
    pub fn without_group(mut self, grupo: ElementGroup) -> Self {
        self.groups.retain(|g| g.grupo != grupo);
        self
    }
}
