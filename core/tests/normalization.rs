//! Field normalizer tests.
//!
//! Tests cover: numeric/text/bool cleaning, header mapping, mandatory-field
//! rejection, missing-column failure, and whole-column percent scale
//! correction.

use idr_core::error::IdrError;
use idr_core::extract::{RawCell, RawTable};
use idr_core::normalize::{
    clean_bool, clean_numeric, clean_text, normalize_table, COLUMN_MAPPING,
};

fn headers() -> Vec<String> {
    COLUMN_MAPPING
        .iter()
        .map(|(source, _)| source.to_string())
        .collect()
}

fn column(source: &str) -> usize {
    COLUMN_MAPPING
        .iter()
        .position(|(s, _)| *s == source)
        .expect("known source column")
}

/// A row that passes normalization: all five mandatory fields present.
fn valid_row(dispute_number: &str) -> Vec<RawCell> {
    let mut row = vec![RawCell::Empty; COLUMN_MAPPING.len()];
    row[column("Dispute Number")] = RawCell::Text(dispute_number.to_string());
    row[column("Payment Determination Outcome")] =
        RawCell::Text("In Favor of Provider/Facility/AA Provider".to_string());
    row[column("Practice/Facility Specialty or Type")] =
        RawCell::Text("Emergency Medicine".to_string());
    row[column("Location of Service")] = RawCell::Text("NY".to_string());
    row[column("Practice/Facility Size")] = RawCell::Text("50-99 Employees".to_string());
    row
}

fn table(rows: Vec<Vec<RawCell>>) -> RawTable {
    RawTable {
        headers: headers(),
        rows,
    }
}

/// Test 1: the extract's "at least this value" suppression marker is
/// discarded and the bare number kept.
#[test]
fn numeric_cleaning_strips_suppression_marker() {
    assert_eq!(clean_numeric("85.5%+"), Some(85.5));
    assert_eq!(clean_numeric("1,234"), Some(1234.0));
    assert_eq!(clean_numeric("  42 "), Some(42.0));
    assert_eq!(clean_numeric("n/a"), None);
    assert_eq!(clean_numeric(""), None);
}

/// Test 1b: tokens the float parser accepts but that carry no value
/// (`nan`, `inf`) are nulled, never surfaced as non-finite numbers.
#[test]
fn numeric_cleaning_nulls_non_finite_tokens() {
    assert_eq!(clean_numeric("nan"), None);
    assert_eq!(clean_numeric("NaN"), None);
    assert_eq!(clean_numeric("inf"), None);
    assert_eq!(clean_numeric("-inf"), None);
    assert_eq!(clean_numeric("infinity"), None);
}

/// Test 1c: a literal nan cell in a percent column normalizes to null
/// for the whole record, so downstream means stay finite.
#[test]
fn nan_cell_in_percent_column_becomes_null() {
    let offer = column("Provider/Facility Offer as % of QPA");
    let mut with_nan = valid_row("DISP-0");
    with_nan[offer] = RawCell::Text("nan".to_string());
    let mut with_value = valid_row("DISP-1");
    with_value[offer] = RawCell::Number(120.0);

    let normalized = normalize_table(&table(vec![with_nan, with_value])).unwrap();
    assert_eq!(normalized.records.len(), 2);
    assert_eq!(normalized.records[0].provider_offer_pct_qpa, None);
    assert_eq!(normalized.records[1].provider_offer_pct_qpa, Some(120.0));
}

/// Test 2: text cleaning nulls out blanks and the literal nan token.
#[test]
fn text_cleaning_maps_blank_and_nan_to_null() {
    assert_eq!(clean_text("  Emergency Medicine  "), Some("Emergency Medicine".to_string()));
    assert_eq!(clean_text(""), None);
    assert_eq!(clean_text("   "), None);
    assert_eq!(clean_text("nan"), None);
    assert_eq!(clean_text("NaN"), None);
}

/// Test 3: boolean vocabulary is fixed; anything else is null.
#[test]
fn bool_cleaning_uses_fixed_vocabulary() {
    assert_eq!(clean_bool("Yes"), Some(true));
    assert_eq!(clean_bool("Y"), Some(true));
    assert_eq!(clean_bool("No"), Some(false));
    assert_eq!(clean_bool("N"), Some(false));
    assert_eq!(clean_bool("maybe"), None);
    assert_eq!(clean_bool(""), None);
}

/// Test 4: a fraction-encoded percent column (max ≤ 10) is scaled ×100
/// across the whole column.
#[test]
fn percent_column_scaled_when_fraction_encoded() {
    let offer = column("Provider/Facility Offer as % of QPA");
    let mut rows = Vec::new();
    for (i, v) in [0.8, 0.95, 1.0].iter().enumerate() {
        let mut row = valid_row(&format!("DISP-{i}"));
        row[offer] = RawCell::Number(*v);
        rows.push(row);
    }

    let normalized = normalize_table(&table(rows)).unwrap();
    let values: Vec<f64> = normalized
        .records
        .iter()
        .map(|r| r.provider_offer_pct_qpa.unwrap())
        .collect();
    assert_eq!(values, vec![80.0, 95.0, 100.0]);
}

/// Test 5: a column already on the 0-100 scale is left untouched.
#[test]
fn percent_column_untouched_when_already_percent() {
    let offer = column("Provider/Facility Offer as % of QPA");
    let mut rows = Vec::new();
    for (i, v) in [80.0, 95.0, 100.0].iter().enumerate() {
        let mut row = valid_row(&format!("DISP-{i}"));
        row[offer] = RawCell::Number(*v);
        rows.push(row);
    }

    let normalized = normalize_table(&table(rows)).unwrap();
    let values: Vec<f64> = normalized
        .records
        .iter()
        .map(|r| r.provider_offer_pct_qpa.unwrap())
        .collect();
    assert_eq!(values, vec![80.0, 95.0, 100.0]);
}

/// Test 6: scaling is decided per column; a fraction column and a
/// percent column in the same table are handled independently.
#[test]
fn percent_scaling_is_per_column() {
    let provider = column("Provider/Facility Offer as % of QPA");
    let plan = column("Health Plan/Issuer Offer as % of QPA");
    let mut rows = Vec::new();
    for (i, (p, h)) in [(0.5, 120.0), (0.9, 95.0)].iter().enumerate() {
        let mut row = valid_row(&format!("DISP-{i}"));
        row[provider] = RawCell::Number(*p);
        row[plan] = RawCell::Number(*h);
        rows.push(row);
    }

    let normalized = normalize_table(&table(rows)).unwrap();
    assert_eq!(normalized.records[0].provider_offer_pct_qpa, Some(50.0));
    assert_eq!(normalized.records[1].provider_offer_pct_qpa, Some(90.0));
    assert_eq!(normalized.records[0].health_plan_offer_pct_qpa, Some(120.0));
    assert_eq!(normalized.records[1].health_plan_offer_pct_qpa, Some(95.0));
}

/// Test 7: a row missing a mandatory field is rejected, not repaired,
/// and does not sink the rest of the table.
#[test]
fn row_missing_mandatory_field_is_rejected() {
    let mut bad = valid_row("DISP-BAD");
    bad[column("Dispute Number")] = RawCell::Empty;

    let normalized = normalize_table(&table(vec![valid_row("DISP-OK"), bad])).unwrap();
    assert_eq!(normalized.records.len(), 1);
    assert_eq!(normalized.records[0].dispute_number, "DISP-OK");
    assert_eq!(normalized.rejects.len(), 1);
    assert_eq!(normalized.rejects[0].row_index, 1);
    assert!(normalized.rejects[0].dispute_number.is_none());
    assert!(normalized.rejects[0].reason.contains("dispute_number"));
}

/// Test 8: a whitespace-only mandatory cell counts as missing.
#[test]
fn blank_mandatory_cell_counts_as_missing() {
    let mut bad = valid_row("DISP-1");
    bad[column("Location of Service")] = RawCell::Text("   ".to_string());

    let normalized = normalize_table(&table(vec![bad])).unwrap();
    assert!(normalized.records.is_empty());
    assert_eq!(normalized.rejects.len(), 1);
    // The reject still carries the dispute number for the log trail.
    assert_eq!(
        normalized.rejects[0].dispute_number.as_deref(),
        Some("DISP-1")
    );
}

/// Test 9: a required column absent from the header row fails the whole
/// table once, before any row is processed.
#[test]
fn missing_required_column_is_fatal() {
    let mut hs = headers();
    let pos = column("Payment Determination Outcome");
    hs[pos] = "Something Unrelated".to_string();

    let raw = RawTable {
        headers: hs,
        rows: vec![valid_row("DISP-1")],
    };

    match normalize_table(&raw) {
        Err(IdrError::MissingColumns { columns }) => {
            assert_eq!(columns, vec!["payment_determination_outcome".to_string()]);
        }
        other => panic!("expected MissingColumns, got {other:?}"),
    }
}

/// Test 10: numeric identifier cells render without a float suffix.
#[test]
fn numeric_identifier_cells_render_as_integers() {
    let npi = column("Provider/Facility NPI Number");
    let mut row = valid_row("DISP-1");
    row[npi] = RawCell::Number(1234567890.0);

    let normalized = normalize_table(&table(vec![row])).unwrap();
    assert_eq!(
        normalized.records[0].provider_facility_npi.as_deref(),
        Some("1234567890")
    );
}
