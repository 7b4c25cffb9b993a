//! Workbooks of named sheets with automatic recalculation
//!
//! A [`Workbook`] owns its sheets, a formula engine and the dependency graph
//! between cells. Setting a cell re-evaluates every formula downstream of it
//! and reports changed values to registered listeners.
//!
//! # Examples
//!
//! ```
//! use sheetcalc_sheet::{CellValue, Workbook};
//!
//! let mut book = Workbook::new();
//! let (_, name) = book.new_sheet(None).unwrap();
//! assert_eq!(name, "Sheet1");
//!
//! book.set_cell_contents("Sheet1", "A1", Some("5")).unwrap();
//! book.set_cell_contents("Sheet1", "B1", Some("=A1*2")).unwrap();
//! assert_eq!(book.get_cell_value("sheet1", "b1").unwrap(), CellValue::from(10_i64));
//!
//! book.set_cell_contents("Sheet1", "A1", Some("7")).unwrap();
//! assert_eq!(book.get_cell_value("Sheet1", "B1").unwrap(), CellValue::from(14_i64));
//! ```
//!
//! ## Saving and loading
//!
//! ```no_run
//! use sheetcalc_sheet::Workbook;
//!
//! let book = Workbook::load_from_path("budget.json").unwrap();
//! book.save_to_path("budget-copy.json").unwrap();
//! ```

mod book;
mod config;
mod error;
mod json;
mod sheet;

pub use book::{ChangeListener, ChangedCell, Workbook};
pub use config::WorkbookConfig;
pub use error::{Result, WorkbookError};
pub use sheet::{Cell, Sheet};
pub use sheetcalc_primitives::{CellError, CellKey, CellLocation, CellValue, ErrorKind};
