//! Peer-benchmarking engine.
//!
//! The entire contract consumed by any presentation layer:
//! [`BenchmarkDataset::available_filters`], [`BenchmarkDataset::compute_metrics`]
//! and [`BenchmarkDataset::compare_to_peers`]. Metrics are aggregated
//! fresh per call over an in-memory snapshot; nothing is cached across
//! filter changes.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::IdrResult;
use crate::normalize::DisputeRecord;
use crate::store::DisputeStore;
use crate::types::OutcomeClass;

/// Subset selector: a conjunction of exact matches. A `None` dimension
/// places no restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkFilters {
    pub specialty: Option<String>,
    /// Location of service, e.g. a state or territory label.
    pub state: Option<String>,
    pub practice_size: Option<String>,
    /// Matches any record whose service code is in the set.
    pub service_codes: Option<Vec<String>>,
}

/// Aggregate over one filtered subset.
///
/// Every rate and mean is `Option<f64>`: an empty subset yields
/// `total_disputes == 0` and `None` everywhere, which keeps "no data"
/// distinguishable from a genuine 0%.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkMetrics {
    pub total_disputes: usize,
    /// Percentage of disputes decided in favor of the provider.
    pub provider_win_rate: Option<f64>,
    pub avg_provider_offer_pct: Option<f64>,
    pub avg_prevailing_offer_pct: Option<f64>,
    pub median_resolution_days: Option<f64>,
    pub avg_idre_compensation: Option<f64>,
    /// Up to ten (code, frequency) pairs, most frequent first.
    pub top_service_codes: Vec<(String, usize)>,
}

/// Distinct values available for each filter dimension.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub specialties: Vec<String>,
    pub states: Vec<String>,
    pub practice_sizes: Vec<String>,
    /// Top twenty service codes by frequency, most frequent first.
    pub top_service_codes: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerComparison {
    pub subject: BenchmarkMetrics,
    pub peers: BenchmarkMetrics,
}

/// In-memory snapshot the engine aggregates over.
pub struct BenchmarkDataset {
    records: Vec<DisputeRecord>,
}

impl BenchmarkDataset {
    pub fn new(records: Vec<DisputeRecord>) -> Self {
        Self { records }
    }

    /// Snapshot every persisted dispute into a dataset.
    pub fn from_store(store: &DisputeStore) -> IdrResult<Self> {
        Ok(Self::new(store.fetch_all_disputes()?))
    }

    /// Distinct values over the full dataset, for populating a
    /// selection UI. Dimension lists are sorted; service codes come
    /// back as the twenty most frequent.
    pub fn available_filters(&self) -> FilterOptions {
        let mut specialties: Vec<String> = Vec::new();
        let mut states: Vec<String> = Vec::new();
        let mut sizes: Vec<String> = Vec::new();
        let mut code_counts: HashMap<&str, usize> = HashMap::new();

        for record in &self.records {
            if !specialties.contains(&record.practice_facility_specialty) {
                specialties.push(record.practice_facility_specialty.clone());
            }
            if !states.contains(&record.location_of_service) {
                states.push(record.location_of_service.clone());
            }
            if !sizes.contains(&record.practice_facility_size) {
                sizes.push(record.practice_facility_size.clone());
            }
            if let Some(code) = &record.service_code {
                *code_counts.entry(code).or_insert(0) += 1;
            }
        }

        specialties.sort();
        states.sort();
        sizes.sort();

        FilterOptions {
            specialties,
            states,
            practice_sizes: sizes,
            top_service_codes: top_codes(&code_counts, 20),
        }
    }

    /// Aggregate the subset selected by `filters`.
    pub fn compute_metrics(&self, filters: &BenchmarkFilters) -> BenchmarkMetrics {
        let subset: Vec<&DisputeRecord> = self
            .records
            .iter()
            .filter(|record| matches_filters(record, filters))
            .collect();

        if subset.is_empty() {
            return BenchmarkMetrics::default();
        }

        let wins = subset
            .iter()
            .filter(|r| {
                OutcomeClass::classify(&r.payment_determination_outcome)
                    == OutcomeClass::FavorProvider
            })
            .count();

        let mut code_counts: HashMap<&str, usize> = HashMap::new();
        for record in &subset {
            if let Some(code) = &record.service_code {
                *code_counts.entry(code).or_insert(0) += 1;
            }
        }

        BenchmarkMetrics {
            total_disputes: subset.len(),
            provider_win_rate: Some(wins as f64 * 100.0 / subset.len() as f64),
            avg_provider_offer_pct: mean(subset.iter().filter_map(|r| r.provider_offer_pct_qpa)),
            avg_prevailing_offer_pct: mean(
                subset.iter().filter_map(|r| r.prevailing_party_offer_pct_qpa),
            ),
            median_resolution_days: median(
                subset.iter().filter_map(|r| r.length_determination_days),
            ),
            avg_idre_compensation: mean(subset.iter().filter_map(|r| r.idre_compensation)),
            top_service_codes: top_codes(&code_counts, 10),
        }
    }

    /// Compare a subject population against its peer group.
    ///
    /// Without an explicit peer filter, peers are the broadest
    /// population sharing the subject's specialty: geography and
    /// practice size are deliberately unrestricted.
    pub fn compare_to_peers(
        &self,
        subject: &BenchmarkFilters,
        peers: Option<&BenchmarkFilters>,
    ) -> PeerComparison {
        let default_peers = BenchmarkFilters {
            specialty: subject.specialty.clone(),
            ..BenchmarkFilters::default()
        };
        let peer_filters = peers.unwrap_or(&default_peers);

        PeerComparison {
            subject: self.compute_metrics(subject),
            peers: self.compute_metrics(peer_filters),
        }
    }
}

fn matches_filters(record: &DisputeRecord, filters: &BenchmarkFilters) -> bool {
    if let Some(specialty) = &filters.specialty {
        if record.practice_facility_specialty != *specialty {
            return false;
        }
    }
    if let Some(state) = &filters.state {
        if record.location_of_service != *state {
            return false;
        }
    }
    if let Some(size) = &filters.practice_size {
        if record.practice_facility_size != *size {
            return false;
        }
    }
    if let Some(codes) = &filters.service_codes {
        match &record.service_code {
            Some(code) if codes.iter().any(|c| c == code) => {}
            _ => return false,
        }
    }
    true
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Median; an even count averages the two middle values.
fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Most frequent codes first; frequency ties break alphabetically so
/// output is stable.
fn top_codes(counts: &HashMap<&str, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts
        .iter()
        .map(|(code, n)| (code.to_string(), *n))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
