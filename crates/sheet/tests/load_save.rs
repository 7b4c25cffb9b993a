use serde_json::{json, Value};
use sheetcalc_sheet::{CellValue, ErrorKind, Result, Workbook, WorkbookConfig, WorkbookError};

const SAMPLE: &str = r#"{
    "sheets": [
        {
            "name": "Sheet1",
            "cell-contents": {
                "a1": "=b1+c1",
                "B1": "12",
                "C1": "=Totals!A1 * 2"
            }
        },
        {
            "name": "Totals",
            "cell-contents": {
                "A1": "'5",
                "A2": "=Sheet1!A1"
            }
        }
    ]
}"#;

#[test]
fn test_load_recomputes_values() -> Result<()> {
    let book = Workbook::from_json_str(SAMPLE)?;
    assert_eq!(book.list_sheets(), vec!["Sheet1", "Totals"]);
    assert_eq!(book.get_cell_value("Sheet1", "C1")?, CellValue::from(10_i64));
    assert_eq!(book.get_cell_value("Sheet1", "A1")?, CellValue::from(22_i64));
    assert_eq!(book.get_cell_value("Totals", "A2")?, CellValue::from(22_i64));
    assert_eq!(
        book.get_cell_contents("Sheet1", "A1")?.as_deref(),
        Some("=b1+c1")
    );
    Ok(())
}

#[test]
fn test_save_writes_contents_in_order() -> Result<()> {
    let book = Workbook::from_json_str(SAMPLE)?;
    let saved: Value = serde_json::from_str(&book.to_json_string()?).unwrap();

    assert_eq!(
        saved,
        json!({
            "sheets": [
                {
                    "name": "Sheet1",
                    "cell-contents": {"A1": "=b1+c1", "B1": "12", "C1": "=Totals!A1 * 2"}
                },
                {
                    "name": "Totals",
                    "cell-contents": {"A1": "'5", "A2": "=Sheet1!A1"}
                }
            ]
        })
    );
    Ok(())
}

#[test]
fn test_save_keeps_empty_sheets_and_row_major_order() -> Result<()> {
    let mut book = Workbook::new();
    book.new_sheet(Some("Data"))?;
    book.new_sheet(Some("Blank"))?;
    book.set_cell_contents("Data", "B2", Some("b2"))?;
    book.set_cell_contents("Data", "A2", Some("a2"))?;
    book.set_cell_contents("Data", "C1", Some("c1"))?;

    let text = book.to_json_string()?;
    let c1 = text.find("\"C1\"").unwrap();
    let a2 = text.find("\"A2\"").unwrap();
    let b2 = text.find("\"B2\"").unwrap();
    assert!(c1 < a2 && a2 < b2);

    let saved: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(saved["sheets"][1], json!({"name": "Blank", "cell-contents": {}}));
    Ok(())
}

#[test]
fn test_file_round_trip_keeps_cycles_and_errors() -> Result<()> {
    let mut book = Workbook::new();
    book.new_sheet(Some("My Sheet"))?;
    book.set_cell_contents("My Sheet", "A1", Some("=A2"))?;
    book.set_cell_contents("My Sheet", "A2", Some("=A1"))?;
    book.set_cell_contents("My Sheet", "B1", Some("=1/0"))?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("book.json");
    book.save_to_path(&path)?;

    let loaded = Workbook::load_from_path(&path)?;
    assert_eq!(loaded.list_sheets(), vec!["My Sheet"]);
    assert_eq!(
        loaded.get_cell_value("my sheet", "A1")?.error_kind(),
        Some(ErrorKind::CircularReference)
    );
    assert_eq!(
        loaded.get_cell_value("My Sheet", "B1")?.error_kind(),
        Some(ErrorKind::DivideByZero)
    );
    Ok(())
}

#[test]
fn test_cells_are_loaded_in_file_order() {
    let text = r#"{"sheets": [{"name": "S", "cell-contents": {"Z1": 5, "A0": "x"}}]}"#;
    assert!(matches!(
        Workbook::from_json_str(text),
        Err(WorkbookError::WrongType { .. })
    ));

    let text = r#"{"sheets": [{"name": "S", "cell-contents": {"A0": "x", "Z1": 5}}]}"#;
    assert!(matches!(
        Workbook::from_json_str(text),
        Err(WorkbookError::InvalidLocation { .. })
    ));
}

#[test]
fn test_load_with_config() -> Result<()> {
    let text = r#"{"sheets": [{"name": "S", "cell-contents": {"A1": "1", "B1": "=SUM(A1:A3)"}}]}"#;
    let config = WorkbookConfig::default().with_max_range_cells(2);
    let book = Workbook::load_workbook_with_config(text.as_bytes(), config)?;

    assert_eq!(book.config().max_range_cells, 2);
    assert_eq!(
        book.get_cell_value("S", "B1")?.error_kind(),
        Some(ErrorKind::BadReference)
    );
    assert_eq!(
        Workbook::from_json_str(text)?.get_cell_value("S", "B1")?,
        CellValue::from(1_i64)
    );
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Workbook::load_from_path(dir.path().join("absent.json")),
        Err(WorkbookError::Io(_))
    ));
}

#[test]
fn test_load_errors() {
    let cases = [
        ("not json", "json"),
        (r#"{"sheets": {}}"#, "wrong type"),
        (r#"{"sheets": [{"cell-contents": {}}]}"#, "missing key"),
        (r#"{"sheets": [{"name": "S"}]}"#, "missing key"),
        (r#"{"sheets": [{"name": "S", "cell-contents": []}]}"#, "wrong type"),
        (r#"{"sheets": [{"name": "S", "cell-contents": {"A1": 5}}]}"#, "wrong type"),
        (r#"{"sheets": [{"name": "S", "cell-contents": {"A0": "5"}}]}"#, "location"),
        (r#"{"sheets": [{"name": "'bad'", "cell-contents": {}}]}"#, "name"),
        (
            r#"{"sheets": [{"name": "S", "cell-contents": {}}, {"name": "s", "cell-contents": {}}]}"#,
            "duplicate",
        ),
    ];

    for (text, expected) in cases {
        let result = Workbook::from_json_str(text);
        let matched = match expected {
            "json" => matches!(result, Err(WorkbookError::Json(_))),
            "wrong type" => matches!(result, Err(WorkbookError::WrongType { .. })),
            "missing key" => matches!(result, Err(WorkbookError::MissingKey { .. })),
            "location" => matches!(result, Err(WorkbookError::InvalidLocation { .. })),
            "name" => matches!(result, Err(WorkbookError::InvalidSheetName { .. })),
            "duplicate" => matches!(result, Err(WorkbookError::SheetAlreadyExists { .. })),
            _ => unreachable!(),
        };
        assert!(matched, "{text} should fail with {expected}");
    }
}
