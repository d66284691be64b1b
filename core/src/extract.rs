//! Spreadsheet extract reader.
//!
//! Converts one named sheet of the quarterly workbook into a [`RawTable`]
//! of untyped cells, so normalization never touches the file format.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{IdrError, IdrResult};

/// Sheet the federal extract ships dispute rows on.
pub const DEFAULT_SHEET: &str = "OON Emergency and Non-Emergency";

/// One cell as it came out of the workbook, before any cleaning.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

/// A sheet's header row plus its data rows, in sheet order.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

/// Read the named sheet of an xls/xlsx workbook.
///
/// A missing file or missing sheet is a configuration error; no rows
/// are skipped or repaired at this stage.
pub fn read_sheet(path: &Path, sheet_name: &str) -> IdrResult<RawTable> {
    let mut workbook = open_workbook_auto(path)?;

    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|_| IdrError::SheetNotFound {
            name: sheet_name.to_string(),
        })?;

    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.trim().to_string(),
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
        None => Vec::new(),
    };

    let data_rows: Vec<Vec<RawCell>> = rows
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();

    log::info!(
        "read {} rows x {} columns from sheet '{}' of {}",
        data_rows.len(),
        headers.len(),
        sheet_name,
        path.display()
    );

    Ok(RawTable {
        headers,
        rows: data_rows,
    })
}

fn convert_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Float(f) => RawCell::Number(*f),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => RawCell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
        // Cell-level #N/A, #DIV/0! and friends carry no usable value.
        Data::Error(_) => RawCell::Empty,
    }
}
