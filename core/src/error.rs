use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdrError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sheet '{name}' not found in workbook")]
    SheetNotFound { name: String },

    #[error("Required columns missing after header mapping: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type IdrResult<T> = Result<T, IdrError>;
