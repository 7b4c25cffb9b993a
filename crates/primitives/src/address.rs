//! A1-style cell locations, formula references and sheet-name quoting.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::AddressError;

/// Column index of "ZZZZ" (1-based).
pub const MAX_COLUMN: u32 = 475_254;
/// Highest addressable row.
pub const MAX_ROW: u32 = 9999;

/// A 1-based cell location (e.g. `A1` is col 1, row 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellLocation {
    pub col: u32,
    pub row: u32,
}

impl CellLocation {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// Parse a user-supplied location such as `"b12"`.
    ///
    /// No whitespace or `$` anchors are accepted, at most four letters and
    /// four digits are allowed and the row may not start with zero.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let caps = location_regex()
            .captures(s)
            .ok_or_else(|| AddressError::InvalidLocation(s.to_string()))?;
        let col = column_letters_to_index(&caps[1])?;
        let row = caps[2]
            .parse::<u32>()
            .map_err(|_| AddressError::InvalidRow(caps[2].to_string()))?;
        Ok(Self { col, row })
    }

    /// True when the location lies inside `A1..ZZZZ9999`.
    pub fn in_bounds(&self) -> bool {
        (1..=MAX_COLUMN).contains(&self.col) && (1..=MAX_ROW).contains(&self.row)
    }

    /// Offset by a column/row delta, returning `None` outside the address space.
    pub fn offset(&self, d_col: i64, d_row: i64) -> Option<Self> {
        let col = i64::from(self.col) + d_col;
        let row = i64::from(self.row) + d_row;
        let moved = Self {
            col: u32::try_from(col).ok()?,
            row: u32::try_from(row).ok()?,
        };
        moved.in_bounds().then_some(moved)
    }
}

impl fmt::Display for CellLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_index_to_letters(self.col), self.row)
    }
}

impl FromStr for CellLocation {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Returns true if `s` is a valid cell location string.
pub fn is_valid_location(s: &str) -> bool {
    CellLocation::parse(s).is_ok()
}

/// A cell reference as written inside a formula, with `$` anchors.
///
/// The location is not bounds-checked at parse time; a reference such as
/// `AAAAA1` parses but fails [`CellReference::in_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellReference {
    pub location: CellLocation,
    pub abs_col: bool,
    pub abs_row: bool,
}

impl CellReference {
    pub fn relative(location: CellLocation) -> Self {
        Self {
            location,
            abs_col: false,
            abs_row: false,
        }
    }

    /// Parse A1 notation preserving absolute/mixed anchors (e.g. `$A$1`, `A$1`).
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let caps = reference_regex()
            .captures(s)
            .ok_or_else(|| AddressError::InvalidLocation(s.to_string()))?;
        let col = column_letters_to_index(&caps[2])?;
        let row = caps[4]
            .parse::<u32>()
            .map_err(|_| AddressError::InvalidRow(caps[4].to_string()))?;
        Ok(Self {
            location: CellLocation::new(col, row),
            abs_col: !caps[1].is_empty(),
            abs_row: !caps[3].is_empty(),
        })
    }

    pub fn in_bounds(&self) -> bool {
        self.location.in_bounds()
    }

    /// Shift the relative components; anchored components stay put.
    pub fn shifted(&self, d_col: i64, d_row: i64) -> Option<Self> {
        let d_col = if self.abs_col { 0 } else { d_col };
        let d_row = if self.abs_row { 0 } else { d_row };
        let location = self.location.offset(d_col, d_row)?;
        Some(Self { location, ..*self })
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.abs_col { "$" } else { "" },
            column_index_to_letters(self.location.col),
            if self.abs_row { "$" } else { "" },
            self.location.row
        )
    }
}

/// Convert column letters to a 1-based index (A -> 1, Z -> 26, AA -> 27).
pub fn column_letters_to_index(letters: &str) -> Result<u32, AddressError> {
    if letters.is_empty() {
        return Err(AddressError::InvalidColumn(letters.to_string()));
    }
    let mut result: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(AddressError::InvalidColumn(letters.to_string()));
        }
        let value = u32::from(ch.to_ascii_uppercase() as u8 - b'A' + 1);
        result = result
            .checked_mul(26)
            .and_then(|v| v.checked_add(value))
            .ok_or_else(|| AddressError::InvalidColumn(letters.to_string()))?;
    }
    Ok(result)
}

/// Convert a 1-based column index to letters (1 -> A, 27 -> AA).
pub fn column_index_to_letters(index: u32) -> String {
    let mut n = index;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// True unless the name is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn sheet_name_needs_quotes(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return true,
    }
    !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render a sheet name for use in a formula, quoting only when required.
pub fn format_sheet_name(name: &str) -> String {
    if sheet_name_needs_quotes(name) {
        format!("'{}'", name)
    } else {
        name.to_string()
    }
}

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]{1,4})([1-9][0-9]{0,3})$").expect("valid regex"))
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\$?)([A-Za-z]+)(\$?)([0-9]+)$").expect("valid regex"))
}
