use thiserror::Error;

/// Errors that can occur during workbook operations
///
/// Problems inside a formula are never reported here; they become
/// `CellValue::Error` values stored in the cell.
#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Sheet not found: {name}")]
    SheetNotFound { name: String },

    #[error("Invalid cell location: {location}")]
    InvalidLocation { location: String },

    #[error("Invalid sheet name: {name:?}")]
    InvalidSheetName { name: String },

    #[error("Sheet already exists: {name}")]
    SheetAlreadyExists { name: String },

    #[error("Sheet index out of range: {index} (workbook has {count} sheets)")]
    SheetIndexOutOfRange { index: usize, count: usize },

    #[error("Target region starting at {location} falls outside A1:ZZZZ9999")]
    RegionOutOfBounds { location: String },

    #[error("Invalid sort columns {columns:?} for a region {width} columns wide")]
    InvalidSortColumns { columns: Vec<i32>, width: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing key '{key}' in {context}")]
    MissingKey { key: String, context: String },

    #[error("Wrong type for {context}: expected {expected}")]
    WrongType {
        context: String,
        expected: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkbookError>;
