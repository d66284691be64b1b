//! Field normalization: raw spreadsheet rows → typed dispute records.
//!
//! Pure transform, no I/O. A malformed row is rejected and reported,
//! never repaired and never fatal; only a missing required column in
//! the header row aborts the whole table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IdrError, IdrResult};
use crate::extract::{RawCell, RawTable};
use crate::types::Quarter;

/// Source spreadsheet header → normalized field name, exactly as the
/// federal extract ships them.
pub const COLUMN_MAPPING: &[(&str, &str)] = &[
    ("Dispute Number", "dispute_number"),
    ("DLI Number", "dli_number"),
    ("Payment Determination Outcome", "payment_determination_outcome"),
    ("Default Decision", "default_decision"),
    ("Type of Dispute", "type_of_dispute"),
    ("Dispute Line Item Type", "dispute_line_item_type"),
    ("Provider/Facility Group Name", "provider_facility_group_name"),
    ("Provider/Facility Name", "provider_facility_name"),
    ("Provider Email Domain", "provider_email_domain"),
    ("Provider/Facility NPI Number", "provider_facility_npi"),
    ("Practice/Facility Size", "practice_facility_size"),
    (
        "Practice/Facility Specialty or Type",
        "practice_facility_specialty",
    ),
    ("Health Plan/Issuer Name", "health_plan_issuer_name"),
    ("Health Plan/Issuer Email Domain", "health_plan_email_domain"),
    ("Health Plan Type", "health_plan_type"),
    (
        "Length of Time to Make Determination",
        "length_determination_days",
    ),
    ("IDRE Compensation", "idre_compensation"),
    ("Type of Service Code", "type_of_service_code"),
    ("Service Code", "service_code"),
    ("Place of Service Code", "place_of_service_code"),
    ("Item or Service Description", "item_service_description"),
    ("Location of Service", "location_of_service"),
    ("Provider/Facility Offer as % of QPA", "provider_offer_pct_qpa"),
    (
        "Health Plan/Issuer Offer as % of QPA",
        "health_plan_offer_pct_qpa",
    ),
    (
        "Offer Selected from Provider or Issuer",
        "offer_selected_from",
    ),
    (
        "Prevailing Party Offer as % of QPA",
        "prevailing_party_offer_pct_qpa",
    ),
    ("QPA as Percent of Median QPA", "qpa_pct_median_qpa"),
    (
        "Provider/Facility Offer as Percent of Median Provider/Facility Offer Amount",
        "provider_offer_pct_median",
    ),
    (
        "Health Plan/Issuer Offer as Percent of Median Health Plan/Issuer Offer Amount",
        "health_plan_offer_pct_median",
    ),
    (
        "Prevailing Offer as Percent of Median Prevailing Offer Amount",
        "prevailing_offer_pct_median",
    ),
    ("Initiating Party", "initiating_party"),
];

/// Fields a row must carry to be loadable at all.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "dispute_number",
    "payment_determination_outcome",
    "practice_facility_specialty",
    "location_of_service",
    "practice_facility_size",
];

/// A column whose observed maximum is at or below this is taken to be
/// fraction-encoded (0–1) and scaled to the 0–100 percent scale.
const PERCENT_SCALE_THRESHOLD: f64 = 10.0;

/// One normalized, resolved payment-dispute line.
///
/// `data_quarter` is left empty here; the loader stamps it with the
/// caller-supplied quarter tag before any write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub dispute_number: String,
    pub dli_number: Option<String>,
    pub payment_determination_outcome: String,
    pub default_decision: Option<bool>,
    pub type_of_dispute: Option<String>,
    pub dispute_line_item_type: Option<String>,
    pub provider_facility_group_name: Option<String>,
    pub provider_facility_name: Option<String>,
    pub provider_email_domain: Option<String>,
    pub provider_facility_npi: Option<String>,
    pub practice_facility_size: String,
    pub practice_facility_specialty: String,
    pub health_plan_issuer_name: Option<String>,
    pub health_plan_email_domain: Option<String>,
    pub health_plan_type: Option<String>,
    pub length_determination_days: Option<f64>,
    pub idre_compensation: Option<f64>,
    pub type_of_service_code: Option<String>,
    pub service_code: Option<String>,
    pub place_of_service_code: Option<String>,
    pub item_service_description: Option<String>,
    pub location_of_service: String,
    pub provider_offer_pct_qpa: Option<f64>,
    pub health_plan_offer_pct_qpa: Option<f64>,
    pub offer_selected_from: Option<String>,
    pub prevailing_party_offer_pct_qpa: Option<f64>,
    pub qpa_pct_median_qpa: Option<f64>,
    pub provider_offer_pct_median: Option<f64>,
    pub health_plan_offer_pct_median: Option<f64>,
    pub prevailing_offer_pct_median: Option<f64>,
    pub initiating_party: Option<String>,
    pub data_quarter: Quarter,
}

/// Why one row was excluded from the loadable set.
#[derive(Debug, Clone, Serialize)]
pub struct RowReject {
    /// Zero-based index into the sheet's data rows (header excluded).
    pub row_index: usize,
    pub dispute_number: Option<String>,
    pub reason: String,
}

/// Output of normalizing a whole sheet.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    pub records: Vec<DisputeRecord>,
    pub rejects: Vec<RowReject>,
}

/// Strip `+`, `,` and `%` then parse as a float.
///
/// The extract suppresses large offers as e.g. `"85.5%+"` ("this value
/// or higher"); the open-ended marker is discarded and the bare value
/// kept. Non-finite parses (`nan`, `inf`) are nulled: the float parser
/// accepts those tokens, but a cell carrying one holds no value.
pub fn clean_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '+' | ',' | '%'))
        .collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Trim, then map empty strings and the extract's literal `nan` to null.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Map the extract's small yes/no vocabulary; anything else is null.
pub fn clean_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "Yes" | "Y" => Some(true),
        "No" | "N" => Some(false),
        _ => None,
    }
}

struct RowView<'a> {
    cells: &'a [RawCell],
    index: &'a HashMap<&'static str, usize>,
}

impl RowView<'_> {
    fn cell(&self, field: &str) -> &RawCell {
        self.index
            .get(field)
            .and_then(|&i| self.cells.get(i))
            .unwrap_or(&RawCell::Empty)
    }

    fn text(&self, field: &str) -> Option<String> {
        match self.cell(field) {
            RawCell::Text(s) => clean_text(s),
            RawCell::Number(n) => Some(format_number(*n)),
            RawCell::Bool(b) => Some(if *b { "Yes".into() } else { "No".into() }),
            RawCell::Empty => None,
        }
    }

    fn number(&self, field: &str) -> Option<f64> {
        match self.cell(field) {
            RawCell::Number(n) => Some(*n),
            RawCell::Text(s) => clean_numeric(s),
            _ => None,
        }
    }

    fn boolean(&self, field: &str) -> Option<bool> {
        match self.cell(field) {
            RawCell::Bool(b) => Some(*b),
            RawCell::Text(s) => clean_bool(s),
            _ => None,
        }
    }
}

/// Identifier-ish numeric cells (NPI, service codes) come back from the
/// sheet as floats; render integral values without a trailing ".0".
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Normalize a whole sheet.
///
/// Fails fast with [`IdrError::MissingColumns`] if any required target
/// field has no source column; individual bad rows land in
/// [`NormalizedTable::rejects`] instead of failing the table.
pub fn normalize_table(raw: &RawTable) -> IdrResult<NormalizedTable> {
    let index = header_index(&raw.headers);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|field| !index.contains_key(**field))
        .map(|field| (*field).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IdrError::MissingColumns { columns: missing });
    }

    let mut records = Vec::with_capacity(raw.rows.len());
    let mut rejects = Vec::new();

    for (row_index, cells) in raw.rows.iter().enumerate() {
        let row = RowView {
            cells,
            index: &index,
        };

        let dispute_number = row.text("dispute_number");
        let outcome = row.text("payment_determination_outcome");
        let specialty = row.text("practice_facility_specialty");
        let location = row.text("location_of_service");
        let size = row.text("practice_facility_size");

        let mut missing_fields = Vec::new();
        if dispute_number.is_none() {
            missing_fields.push("dispute_number");
        }
        if outcome.is_none() {
            missing_fields.push("payment_determination_outcome");
        }
        if specialty.is_none() {
            missing_fields.push("practice_facility_specialty");
        }
        if location.is_none() {
            missing_fields.push("location_of_service");
        }
        if size.is_none() {
            missing_fields.push("practice_facility_size");
        }

        let (Some(dispute_number), Some(outcome), Some(specialty), Some(location), Some(size)) = (
            dispute_number.clone(),
            outcome,
            specialty,
            location,
            size,
        ) else {
            rejects.push(RowReject {
                row_index,
                dispute_number,
                reason: format!("missing mandatory fields: {}", missing_fields.join(", ")),
            });
            continue;
        };

        records.push(DisputeRecord {
            dispute_number,
            dli_number: row.text("dli_number"),
            payment_determination_outcome: outcome,
            default_decision: row.boolean("default_decision"),
            type_of_dispute: row.text("type_of_dispute"),
            dispute_line_item_type: row.text("dispute_line_item_type"),
            provider_facility_group_name: row.text("provider_facility_group_name"),
            provider_facility_name: row.text("provider_facility_name"),
            provider_email_domain: row.text("provider_email_domain"),
            provider_facility_npi: row.text("provider_facility_npi"),
            practice_facility_size: size,
            practice_facility_specialty: specialty,
            health_plan_issuer_name: row.text("health_plan_issuer_name"),
            health_plan_email_domain: row.text("health_plan_email_domain"),
            health_plan_type: row.text("health_plan_type"),
            length_determination_days: row.number("length_determination_days"),
            idre_compensation: row.number("idre_compensation"),
            type_of_service_code: row.text("type_of_service_code"),
            service_code: row.text("service_code"),
            place_of_service_code: row.text("place_of_service_code"),
            item_service_description: row.text("item_service_description"),
            location_of_service: location,
            provider_offer_pct_qpa: row.number("provider_offer_pct_qpa"),
            health_plan_offer_pct_qpa: row.number("health_plan_offer_pct_qpa"),
            offer_selected_from: row.text("offer_selected_from"),
            prevailing_party_offer_pct_qpa: row.number("prevailing_party_offer_pct_qpa"),
            qpa_pct_median_qpa: row.number("qpa_pct_median_qpa"),
            provider_offer_pct_median: row.number("provider_offer_pct_median"),
            health_plan_offer_pct_median: row.number("health_plan_offer_pct_median"),
            prevailing_offer_pct_median: row.number("prevailing_offer_pct_median"),
            initiating_party: row.text("initiating_party"),
            data_quarter: Quarter::new(),
        });
    }

    correct_percent_scale(&mut records);

    if !rejects.is_empty() {
        log::warn!(
            "{} of {} rows failed normalization and were excluded",
            rejects.len(),
            raw.rows.len()
        );
    }

    Ok(NormalizedTable { records, rejects })
}

fn header_index(headers: &[String]) -> HashMap<&'static str, usize> {
    let mut index = HashMap::new();
    for (pos, header) in headers.iter().enumerate() {
        let trimmed = header.trim();
        for (source, field) in COLUMN_MAPPING {
            if trimmed == *source {
                index.insert(*field, pos);
            }
        }
    }
    index
}

/// Names of the seven QPA-relative percent columns, in the order
/// [`percent_values`] and [`percent_fields_mut`] expose them.
pub const PERCENT_COLUMNS: &[&str] = &[
    "provider_offer_pct_qpa",
    "health_plan_offer_pct_qpa",
    "prevailing_party_offer_pct_qpa",
    "qpa_pct_median_qpa",
    "provider_offer_pct_median",
    "health_plan_offer_pct_median",
    "prevailing_offer_pct_median",
];

fn percent_values(record: &DisputeRecord) -> [Option<f64>; 7] {
    [
        record.provider_offer_pct_qpa,
        record.health_plan_offer_pct_qpa,
        record.prevailing_party_offer_pct_qpa,
        record.qpa_pct_median_qpa,
        record.provider_offer_pct_median,
        record.health_plan_offer_pct_median,
        record.prevailing_offer_pct_median,
    ]
}

fn percent_fields_mut(record: &mut DisputeRecord) -> [&mut Option<f64>; 7] {
    [
        &mut record.provider_offer_pct_qpa,
        &mut record.health_plan_offer_pct_qpa,
        &mut record.prevailing_party_offer_pct_qpa,
        &mut record.qpa_pct_median_qpa,
        &mut record.provider_offer_pct_median,
        &mut record.health_plan_offer_pct_median,
        &mut record.prevailing_offer_pct_median,
    ]
}

/// Per-column scale correction over the whole table.
///
/// The source occasionally encodes a percent column as fractions (0–1).
/// The call is made once per column from its observed maximum: a
/// positive maximum at or below [`PERCENT_SCALE_THRESHOLD`] means the
/// whole column is scaled ×100; any larger value leaves it untouched.
fn correct_percent_scale(records: &mut [DisputeRecord]) {
    let mut maxima = [None::<f64>; 7];
    for record in records.iter() {
        for (max, value) in maxima.iter_mut().zip(percent_values(record)) {
            if let Some(v) = value {
                *max = Some(max.map_or(v, |m: f64| m.max(v)));
            }
        }
    }

    let scale: Vec<bool> = maxima
        .iter()
        .map(|max| max.is_some_and(|m| m > 0.0 && m <= PERCENT_SCALE_THRESHOLD))
        .collect();

    for (column, wants_scale) in PERCENT_COLUMNS.iter().zip(&scale) {
        if *wants_scale {
            log::info!("column {column} is fraction-encoded, scaling values x100");
        }
    }

    for record in records.iter_mut() {
        for (field, wants_scale) in percent_fields_mut(record).into_iter().zip(&scale) {
            if *wants_scale {
                if let Some(v) = field.as_mut() {
                    *v *= 100.0;
                }
            }
        }
    }
}
