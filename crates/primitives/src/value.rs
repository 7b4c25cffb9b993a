//! Typed cell values, the error taxonomy and the coercion rules formulas use.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Closed set of cell error kinds.
///
/// Declaration order doubles as the sort order used when regions are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    ParseError,
    CircularReference,
    BadReference,
    BadName,
    TypeError,
    DivideByZero,
}

impl ErrorKind {
    /// Spreadsheet-style error label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ParseError => "#ERROR!",
            Self::CircularReference => "#CIRCREF!",
            Self::BadReference => "#REF!",
            Self::BadName => "#NAME?",
            Self::TypeError => "#VALUE!",
            Self::DivideByZero => "#DIV/0!",
        }
    }

    /// Match an error label case-insensitively.
    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(text))
    }

    pub const ALL: [ErrorKind; 6] = [
        Self::ParseError,
        Self::CircularReference,
        Self::BadReference,
        Self::BadName,
        Self::TypeError,
        Self::DivideByZero,
    ];

    fn default_detail(&self) -> &'static str {
        match self {
            Self::ParseError => "Formula cannot be parsed.",
            Self::CircularReference => "Cell is part of a circular reference.",
            Self::BadReference => {
                "Invalid cell reference in formula. Check sheet name and cell location."
            }
            Self::BadName => "Function name in formula is unrecognized.",
            Self::TypeError => "Incompatible types of values.",
            Self::DivideByZero => "Cannot divide by zero.",
        }
    }
}

/// An error stored as a cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CellError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            detail: kind.default_detail().to_string(),
        }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Pick the error that wins among several operands.
    ///
    /// A parse error wins outright, then a circular reference, otherwise the
    /// first error in evaluation order.
    pub fn prevailing<'a, I>(values: I) -> Option<CellError>
    where
        I: IntoIterator<Item = &'a CellValue>,
    {
        let mut found: Option<&CellError> = None;
        for value in values {
            let CellValue::Error(err) = value else {
                continue;
            };
            match err.kind {
                ErrorKind::ParseError => return Some(err.clone()),
                ErrorKind::CircularReference => {
                    if found.map_or(true, |f| f.kind != ErrorKind::CircularReference) {
                        found = Some(err);
                    }
                }
                _ => {
                    if found.is_none() {
                        found = Some(err);
                    }
                }
            }
        }
        found.cloned()
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.label())
    }
}

/// Value types that can be stored in cells
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(Decimal),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl CellValue {
    /// Build a number with insignificant trailing zeros stripped.
    pub fn number(value: Decimal) -> Self {
        Self::Number(value.normalize())
    }

    pub fn error(kind: ErrorKind) -> Self {
        Self::Error(CellError::new(kind))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_error(&self) -> Option<&CellError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.as_error().map(|err| err.kind)
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret trimmed, non-formula cell text.
    pub fn parse_literal(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix('\'') {
            return Self::Text(rest.to_string());
        }
        if let Some(kind) = ErrorKind::from_label(text) {
            return Self::error(kind);
        }
        if let Some(number) = parse_number(text) {
            return Self::number(number);
        }
        if text.eq_ignore_ascii_case("true") {
            return Self::Boolean(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Self::Boolean(false);
        }
        Self::Text(text.to_string())
    }

    /// Arithmetic coercion.
    pub fn to_number(&self) -> Result<Decimal, CellError> {
        match self {
            Self::Empty => Ok(Decimal::ZERO),
            Self::Number(n) => Ok(*n),
            Self::Boolean(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
            Self::Text(s) => parse_number(s.trim()).ok_or_else(|| {
                CellError::with_detail(
                    ErrorKind::TypeError,
                    format!("Cannot convert \"{}\" to a number.", s),
                )
            }),
            Self::Error(err) => Err(err.clone()),
        }
    }

    /// String coercion used by `&` and text functions.
    pub fn to_text(&self) -> Result<String, CellError> {
        match self {
            Self::Error(err) => Err(err.clone()),
            other => Ok(other.to_string()),
        }
    }

    /// Boolean coercion used by logical functions and `IF`.
    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            Self::Empty => Ok(false),
            Self::Boolean(b) => Ok(*b),
            Self::Number(n) => Ok(!n.is_zero()),
            Self::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Self::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            Self::Text(s) => Err(CellError::with_detail(
                ErrorKind::TypeError,
                format!("Cannot convert \"{}\" to a boolean.", s),
            )),
            Self::Error(err) => Err(err.clone()),
        }
    }

    /// Ordering used by the comparison operators.
    ///
    /// An empty operand takes the default of the other operand's type
    /// (0, "" or FALSE). Otherwise values of different types order as
    /// Boolean > Text > Number, so they never compare equal. Text compares
    /// case-insensitively. Callers handle errors before comparing.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (Self::Empty, Self::Empty) => Ordering::Equal,
            (Self::Empty, value) => value.blank_of_same_type().compare(value),
            (value, Self::Empty) => value.compare(&value.blank_of_same_type()),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    /// Ordering used when sorting regions:
    /// Empty < Error < Number < Text < Boolean.
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (Self::Error(a), Self::Error(b)) => a.kind.cmp(&b.kind),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Error(_) => 1,
            Self::Number(_) => 2,
            Self::Text(_) => 3,
            Self::Boolean(_) => 4,
        }
    }

    fn blank_of_same_type(&self) -> CellValue {
        match self {
            Self::Number(_) => Self::Number(Decimal::ZERO),
            Self::Text(_) => Self::Text(String::new()),
            Self::Boolean(_) => Self::Boolean(false),
            Self::Empty | Self::Error(_) => Self::Empty,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{}", n.normalize()),
            Self::Text(s) => f.write_str(s),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Error(err) => write!(f, "{}", err),
        }
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        Self::number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<CellError> for CellValue {
    fn from(value: CellError) -> Self {
        Self::Error(value)
    }
}

/// Parse an integer or decimal literal such as `12`, `-1.5`, `+3`, `.25` or `7.`.
pub fn parse_number(text: &str) -> Option<Decimal> {
    if !number_regex().is_match(text) {
        return None;
    }
    let (negative, digits) = match text.as_bytes()[0] {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let digits = digits.strip_suffix('.').unwrap_or(digits);
    let mut normalized = String::with_capacity(digits.len() + 2);
    if negative {
        normalized.push('-');
    }
    if digits.starts_with('.') {
        normalized.push('0');
    }
    normalized.push_str(digits);
    Decimal::from_str(&normalized).ok().map(|d| d.normalize())
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)$").expect("valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(text: &str) -> CellValue {
        CellValue::number(Decimal::from_str(text).unwrap())
    }

    #[test]
    fn test_parse_literal_kinds() {
        assert_eq!(CellValue::parse_literal("12.50"), num("12.5"));
        assert_eq!(CellValue::parse_literal("'12"), CellValue::Text("12".into()));
        assert_eq!(CellValue::parse_literal("tRuE"), CellValue::Boolean(true));
        assert_eq!(
            CellValue::parse_literal("#div/0!").error_kind(),
            Some(ErrorKind::DivideByZero)
        );
        assert_eq!(CellValue::parse_literal("hello"), CellValue::Text("hello".into()));
    }

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse_number("+5"), Some(Decimal::from(5)));
        assert_eq!(parse_number(".123"), Decimal::from_str("0.123").ok());
        assert_eq!(parse_number("-.123"), Decimal::from_str("-0.123").ok());
        assert_eq!(parse_number("123."), Some(Decimal::from(123)));
        assert_eq!(parse_number("1e5"), None);
        assert_eq!(parse_number("."), None);
    }

    #[test]
    fn test_number_display_strips_zeros() {
        assert_eq!(num("1.500").to_string(), "1.5");
        assert_eq!(num("2.000").to_string(), "2");
    }

    #[test]
    fn test_prevailing_error_order() {
        let div = CellValue::error(ErrorKind::DivideByZero);
        let circ = CellValue::error(ErrorKind::CircularReference);
        let parse = CellValue::error(ErrorKind::ParseError);
        let one = CellValue::from(1_i64);

        let winner = CellError::prevailing([&div, &circ]).unwrap();
        assert_eq!(winner.kind, ErrorKind::CircularReference);
        let winner = CellError::prevailing([&circ, &parse]).unwrap();
        assert_eq!(winner.kind, ErrorKind::ParseError);
        let winner = CellError::prevailing([&one, &div]).unwrap();
        assert_eq!(winner.kind, ErrorKind::DivideByZero);
        assert!(CellError::prevailing([&one]).is_none());
    }

    #[test]
    fn test_compare_cross_type() {
        let t = CellValue::Boolean(true);
        let s = CellValue::Text("abc".into());
        let n = CellValue::from(5_i64);
        assert_eq!(t.compare(&s), Ordering::Greater);
        assert_eq!(s.compare(&n), Ordering::Greater);
        assert_eq!(n.compare(&t), Ordering::Less);
        assert_eq!(CellValue::Empty.compare(&CellValue::from(0_i64)), Ordering::Equal);
        assert_eq!(CellValue::Empty.compare(&CellValue::Empty), Ordering::Equal);
        assert_eq!(
            CellValue::Text("ABC".into()).compare(&CellValue::Text("abc".into())),
            Ordering::Equal
        );
    }
}
