//! Post-load operator report.
//!
//! Read-only and best-effort: a failing aggregation query is logged
//! and swallowed, it never fails a load that already committed.

use serde::Serialize;

use crate::store::DisputeStore;

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStats {
    pub total_disputes: i64,
    pub by_quarter: Vec<QuarterCount>,
    pub top_specialties: Vec<SpecialtyCount>,
    pub provider_wins: i64,
    /// Percentage, rounded to two decimals.
    pub provider_win_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuarterCount {
    pub data_quarter: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecialtyCount {
    pub specialty: String,
    pub count: i64,
}

/// Run the summary queries, logging instead of propagating on failure.
pub fn best_effort_stats(store: &DisputeStore) -> Option<MigrationStats> {
    match store.migration_stats() {
        Ok(stats) => Some(stats),
        Err(err) => {
            log::warn!("post-load reporting failed (load itself succeeded): {err}");
            None
        }
    }
}

/// Render the operator-facing confirmation block.
pub fn render(stats: &MigrationStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total disputes:    {}\n", stats.total_disputes));
    out.push_str(&format!(
        "Provider win rate: {:.2}% ({} wins)\n",
        stats.provider_win_rate, stats.provider_wins
    ));

    out.push_str("Quarters loaded:\n");
    for quarter in &stats.by_quarter {
        out.push_str(&format!(
            "  {:<10} {:>8}\n",
            quarter.data_quarter, quarter.count
        ));
    }

    out.push_str("Top specialties:\n");
    for specialty in &stats.top_specialties {
        out.push_str(&format!(
            "  {:<50} {:>8}\n",
            specialty.specialty, specialty.count
        ));
    }

    out
}
