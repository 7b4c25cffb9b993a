//! JSON workbook files
//!
//! A workbook is saved as its sheets in order, each with the contents of its
//! non-empty cells:
//!
//! ```json
//! {"sheets": [{"name": "Sheet1", "cell-contents": {"A1": "=B1+1", "B1": "5"}}]}
//! ```
//!
//! Only contents are stored; values are recomputed on load. Sheets are
//! created in array order and each sheet's cells are set in file order.

use crate::book::Workbook;
use crate::config::WorkbookConfig;
use crate::error::{Result, WorkbookError};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Serialize)]
struct WorkbookFile<'a> {
    sheets: Vec<SheetFile<'a>>,
}

#[derive(Serialize)]
struct SheetFile<'a> {
    name: &'a str,
    #[serde(rename = "cell-contents")]
    cell_contents: IndexMap<String, &'a str>,
}

impl Workbook {
    // =========================================================================
    // Loading
    // =========================================================================

    /// Load a workbook from a reader containing workbook JSON
    ///
    /// # Errors
    ///
    /// Malformed JSON, missing keys, values of the wrong type, invalid sheet
    /// names and invalid cell locations are all reported as errors.
    pub fn load_workbook<R: Read>(reader: R) -> Result<Self> {
        Self::load_workbook_with_config(reader, WorkbookConfig::default())
    }

    /// Load a workbook from a reader, recomputing it under `config`
    ///
    /// # Errors
    ///
    /// Same as [`Workbook::load_workbook`].
    pub fn load_workbook_with_config<R: Read>(reader: R, config: WorkbookConfig) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader)?;
        let root = as_object(&value, "workbook")?;
        let sheets = root
            .get("sheets")
            .ok_or_else(|| missing_key("sheets", "workbook"))?
            .as_array()
            .ok_or_else(|| wrong_type("\"sheets\"", "an array"))?;

        let mut book = Workbook::with_config(config);
        for (idx, entry) in sheets.iter().enumerate() {
            let context = format!("sheet at index {idx}");
            let entry = as_object(entry, &context)?;
            let name = entry
                .get("name")
                .ok_or_else(|| missing_key("name", &context))?
                .as_str()
                .ok_or_else(|| wrong_type(&format!("name of {context}"), "a string"))?;
            let contents = entry
                .get("cell-contents")
                .ok_or_else(|| missing_key("cell-contents", &context))?;
            let contents = as_object(contents, &format!("cell-contents of {context}"))?;

            book.new_sheet(Some(name))?;
            for (location, text) in contents {
                let text = text.as_str().ok_or_else(|| {
                    wrong_type(&format!("cell {location} of sheet {name}"), "a string")
                })?;
                book.set_cell_contents(name, location, Some(text))?;
            }
        }

        tracing::debug!(sheets = book.num_sheets(), "loaded workbook");
        Ok(book)
    }

    /// Load a workbook from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::load_workbook(content.as_bytes())
    }

    /// Load a workbook from a JSON file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::load_workbook(BufReader::new(file))
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Write the workbook as pretty-printed JSON
    ///
    /// Sheets are written in workbook order and cells row by row, with
    /// upper-case locations and contents exactly as stored.
    pub fn save_workbook<W: Write>(&self, writer: W) -> Result<()> {
        let names = self.list_sheets();
        let mut sheets = Vec::with_capacity(names.len());
        for name in &names {
            let sheet = self.sheet(name)?;
            let cell_contents = sheet
                .locations()
                .into_iter()
                .filter_map(|loc| sheet.cell_contents(loc).map(|text| (loc.to_string(), text)))
                .collect();
            sheets.push(SheetFile {
                name: sheet.name(),
                cell_contents,
            });
        }

        serde_json::to_writer_pretty(writer, &WorkbookFile { sheets })?;
        Ok(())
    }

    /// Convert the workbook to a pretty-printed JSON string
    pub fn to_json_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.save_workbook(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| WorkbookError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Save the workbook to a JSON file
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.save_workbook(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| wrong_type(context, "an object"))
}

fn missing_key(key: &str, context: &str) -> WorkbookError {
    WorkbookError::MissingKey {
        key: key.to_string(),
        context: context.to_string(),
    }
}

fn wrong_type(context: &str, expected: &'static str) -> WorkbookError {
    WorkbookError::WrongType {
        context: context.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_empty_workbook() {
        let book = Workbook::new();
        let json: Value = serde_json::from_str(&book.to_json_string().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"sheets": []}));
    }

    #[test]
    fn test_error_classes() {
        assert!(matches!(
            Workbook::from_json_str("{\"sheets\": ["),
            Err(WorkbookError::Json(_))
        ));
        assert!(matches!(
            Workbook::from_json_str("{}"),
            Err(WorkbookError::MissingKey { .. })
        ));
        assert!(matches!(
            Workbook::from_json_str("[]"),
            Err(WorkbookError::WrongType { .. })
        ));
        assert!(matches!(
            Workbook::from_json_str(r#"{"sheets": [{"name": 5, "cell-contents": {}}]}"#),
            Err(WorkbookError::WrongType { .. })
        ));
    }
}
