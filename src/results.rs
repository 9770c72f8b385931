// src/results.rs

use chrono::NaiveDateTime;
use log::{info, warn};

use crate::models::{ElementGroup, LoteId, RodoviaId};

/// Statistics for one group's matching run
#[derive(Debug, Clone)]
pub struct GroupMatchStats {
    pub grupo: ElementGroup,

    /// Number of needs the matcher looked at
    pub needs_processed: usize,

    /// Needs that ended up with a qualifying candidate
    pub matched: usize,

    /// Needs with usable geometry but no qualifying candidate
    pub unmatched: usize,

    /// Needs skipped for missing/malformed geometry (review-flagged)
    pub skipped_missing_geometry: usize,

    /// Needs whose recomputed servico disagreed with a stored decision
    pub divergences_flagged: usize,

    /// Average match distance over point-mode matches
    pub avg_distance_meters: Option<f64>,

    /// Average overlap percentage over linear-mode matches
    pub avg_overlap_pct: Option<f64>,

    /// Needs whose recomputed fields were persisted
    pub records_written: usize,

    /// Needs whose write failed (a batch was rolled back); their stored
    /// fields are stale until the next run
    pub failed_writes: usize,
}

impl GroupMatchStats {
    pub fn empty(grupo: ElementGroup) -> Self {
        Self {
            grupo,
            needs_processed: 0,
            matched: 0,
            unmatched: 0,
            skipped_missing_geometry: 0,
            divergences_flagged: 0,
            avg_distance_meters: None,
            avg_overlap_pct: None,
            records_written: 0,
            failed_writes: 0,
        }
    }
}

/// Complete statistics for one reconciliation run over a scope
#[derive(Debug, Clone)]
pub struct ReconRunStats {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub lote_id: LoteId,
    pub rodovia_id: RodoviaId,

    pub group_stats: Vec<GroupMatchStats>,

    /// Groups whose run failed (configuration or backend error) with the
    /// error message; the other groups completed independently
    pub failed_groups: Vec<(ElementGroup, String)>,

    pub matching_time: f64,
    pub total_processing_time: f64,
}

impl ReconRunStats {
    pub fn total_needs_processed(&self) -> usize {
        self.group_stats.iter().map(|g| g.needs_processed).sum()
    }

    pub fn total_matched(&self) -> usize {
        self.group_stats.iter().map(|g| g.matched).sum()
    }

    pub fn total_divergences(&self) -> usize {
        self.group_stats.iter().map(|g| g.divergences_flagged).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.group_stats
            .iter()
            .map(|g| g.skipped_missing_geometry)
            .sum()
    }

    pub fn total_failed_writes(&self) -> usize {
        self.group_stats.iter().map(|g| g.failed_writes).sum()
    }
}

/// Logs a human-readable run report, one block per group
pub fn log_report(stats: &ReconRunStats) {
    info!(
        "Run {} report (lote {}, rodovia {}): {} needs, {} matched, {} divergences, {} skipped, {} failed writes",
        stats.run_id,
        stats.lote_id.0,
        stats.rodovia_id.0,
        stats.total_needs_processed(),
        stats.total_matched(),
        stats.total_divergences(),
        stats.total_skipped(),
        stats.total_failed_writes(),
    );
    for g in &stats.group_stats {
        let quality = match (g.avg_distance_meters, g.avg_overlap_pct) {
            (Some(d), _) => format!("avg distance {:.1}m", d),
            (_, Some(o)) => format!("avg overlap {:.1}%", o),
            _ => "no matches".to_string(),
        };
        info!(
            "  {}: {} processed, {} matched, {} unmatched, {} skipped, {} divergences, {} written ({})",
            g.grupo.as_str(),
            g.needs_processed,
            g.matched,
            g.unmatched,
            g.skipped_missing_geometry,
            g.divergences_flagged,
            g.records_written,
            quality,
        );
        if g.failed_writes > 0 {
            warn!(
                "  {}: {} records failed to persist; their stored match fields are stale",
                g.grupo.as_str(),
                g.failed_writes
            );
        }
    }
    for (grupo, error) in &stats.failed_groups {
        info!("  {}: FAILED ({})", grupo.as_str(), error);
    }
    info!(
        "Run {} timing: matching {:.2}s, total {:.2}s",
        stats.run_id, stats.matching_time, stats.total_processing_time
    );
}
