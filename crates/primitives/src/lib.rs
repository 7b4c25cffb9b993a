//! # sheetcalc primitives
//!
//! Core primitives shared by the calculation engine: cell locations and
//! references, the graph key for a cell, and the typed cell value model with
//! its error taxonomy and coercion rules.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod address;
pub mod value;

pub use address::{
    column_index_to_letters, column_letters_to_index, format_sheet_name, is_valid_location,
    sheet_name_needs_quotes, CellLocation, CellReference, MAX_COLUMN, MAX_ROW,
};
pub use value::{CellError, CellValue, ErrorKind};

/// Identity of a cell inside a workbook: lower-cased sheet key plus location.
///
/// The sheet part is a lookup key, not a display name, so references to a
/// sheet that does not exist yet can still be represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub sheet: String,
    pub location: CellLocation,
}

impl CellKey {
    pub fn new(sheet: &str, location: CellLocation) -> Self {
        Self {
            sheet: sheet.to_lowercase(),
            location,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.location)
    }
}

/// Errors that can occur when parsing addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid column: {0}")]
    InvalidColumn(String),
    #[error("Invalid row: {0}")]
    InvalidRow(String),
    #[error("Invalid cell location: {0}")]
    InvalidLocation(String),
}
