//! Derived-table refresh and migration-report tests.
//!
//! Tests cover: lookup-table population, summary rebuild, refresh
//! idempotency, and the operator stats queries.

use idr_core::error::IdrResult;
use idr_core::loader::load_quarter;
use idr_core::normalize::{DisputeRecord, NormalizedTable};
use idr_core::report;
use idr_core::store::DisputeStore;

const PROVIDER_WIN: &str = "In Favor of Provider/Facility/AA Provider";
const PLAN_WIN: &str = "In Favor of Health Plan/Issuer";

fn dispute(number: &str, specialty: &str, outcome: &str) -> DisputeRecord {
    DisputeRecord {
        dispute_number: number.to_string(),
        payment_determination_outcome: outcome.to_string(),
        practice_facility_specialty: specialty.to_string(),
        practice_facility_size: "Small".to_string(),
        location_of_service: "NY".to_string(),
        service_code: Some("99285".to_string()),
        item_service_description: Some("Emergency department visit".to_string()),
        provider_offer_pct_qpa: Some(150.0),
        prevailing_party_offer_pct_qpa: Some(120.0),
        ..DisputeRecord::default()
    }
}

fn loaded_store() -> IdrResult<DisputeStore> {
    let mut store = DisputeStore::in_memory()?;
    store.provision()?;

    let q1 = vec![
        dispute("D-1", "Emergency Medicine", PROVIDER_WIN),
        dispute("D-2", "Emergency Medicine", PLAN_WIN),
        dispute("D-3", "Radiology", PROVIDER_WIN),
    ];
    let q2 = vec![
        dispute("D-4", "Radiology", PLAN_WIN),
        dispute("D-5", "Radiology", PLAN_WIN),
        dispute("D-6", "Emergency Medicine", PLAN_WIN),
    ];

    load_quarter(
        &mut store,
        NormalizedTable {
            records: q1,
            rejects: Vec::new(),
        },
        "2024-Q1",
    )?;
    load_quarter(
        &mut store,
        NormalizedTable {
            records: q2,
            rejects: Vec::new(),
        },
        "2024-Q2",
    )?;
    store.refresh_derived_tables()?;
    Ok(store)
}

/// Test 1: the refresh populates both lookup tables from the base table.
#[test]
fn refresh_populates_lookup_tables() -> IdrResult<()> {
    let store = loaded_store()?;
    assert_eq!(store.specialty_count()?, 2);
    assert_eq!(store.service_code_count()?, 1);
    Ok(())
}

/// Test 2: the quarter summary carries one row per (quarter, specialty)
/// pair and is rebuilt, not appended, on every refresh.
#[test]
fn quarter_summary_is_rebuilt_in_full() -> IdrResult<()> {
    let mut store = loaded_store()?;
    assert_eq!(store.quarter_summary_count()?, 4);

    store.refresh_derived_tables()?;
    store.refresh_derived_tables()?;
    assert_eq!(store.quarter_summary_count()?, 4);
    assert_eq!(store.specialty_count()?, 2);
    assert_eq!(store.service_code_count()?, 1);
    Ok(())
}

/// Test 3: stats totals and the win-rate rounding rule.
#[test]
fn migration_stats_totals() -> IdrResult<()> {
    let store = loaded_store()?;
    let stats = store.migration_stats()?;

    assert_eq!(stats.total_disputes, 6);
    assert_eq!(stats.provider_wins, 2);
    // 2 of 6 → 33.333…%, rounded to two decimals.
    assert_eq!(stats.provider_win_rate, 33.33);
    Ok(())
}

/// Test 4: quarter counts come back ordered by quarter tag.
#[test]
fn migration_stats_quarters_ordered() -> IdrResult<()> {
    let store = loaded_store()?;
    let stats = store.migration_stats()?;

    let quarters: Vec<(&str, i64)> = stats
        .by_quarter
        .iter()
        .map(|q| (q.data_quarter.as_str(), q.count))
        .collect();
    assert_eq!(quarters, vec![("2024-Q1", 3), ("2024-Q2", 3)]);
    Ok(())
}

/// Test 5: specialties rank by count, ties broken by name for stable
/// output.
#[test]
fn migration_stats_top_specialties() -> IdrResult<()> {
    let store = loaded_store()?;
    let stats = store.migration_stats()?;

    let specialties: Vec<(&str, i64)> = stats
        .top_specialties
        .iter()
        .map(|s| (s.specialty.as_str(), s.count))
        .collect();
    assert_eq!(
        specialties,
        vec![("Emergency Medicine", 3), ("Radiology", 3)]
    );
    Ok(())
}

/// Test 6: an empty store reports zeros rather than failing.
#[test]
fn migration_stats_on_empty_store() -> IdrResult<()> {
    let mut store = DisputeStore::in_memory()?;
    store.provision()?;

    let stats = store.migration_stats()?;
    assert_eq!(stats.total_disputes, 0);
    assert_eq!(stats.provider_wins, 0);
    assert_eq!(stats.provider_win_rate, 0.0);
    assert!(stats.by_quarter.is_empty());
    Ok(())
}

/// Test 7: best-effort reporting returns stats when queries succeed and
/// the rendered block mentions every quarter.
#[test]
fn best_effort_reporting_renders() -> IdrResult<()> {
    let store = loaded_store()?;
    let stats = report::best_effort_stats(&store).expect("stats available");

    let rendered = report::render(&stats);
    assert!(rendered.contains("Total disputes:"));
    assert!(rendered.contains("2024-Q1"));
    assert!(rendered.contains("2024-Q2"));
    assert!(rendered.contains("Emergency Medicine"));
    Ok(())
}
