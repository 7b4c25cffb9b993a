//! # sheetcalc-cli
//!
//! Command-line interface for sheetcalc workbooks.

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use sheetcalc_sheet::{CellValue, Workbook};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// sheetcalc - spreadsheet workbooks from the command line
#[derive(Parser)]
#[command(name = "sheetcalc")]
#[command(author, version, about = "Spreadsheet calculation engine", long_about = None)]
struct Cli {
    /// Workbook JSON file to load
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Set a cell before printing (SHEET!A1=CONTENTS)
    #[arg(short = 's', long = "set", value_name = "CELL=CONTENTS")]
    set: Vec<String>,

    /// Print a single cell value (SHEET!A1)
    #[arg(short = 'g', long = "get", value_name = "CELL")]
    get: Vec<String>,

    /// Output format (table, json)
    #[arg(short = 'f', long = "format", default_value = "table")]
    format: OutputFormat,

    /// Save the workbook to this file when done
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Start REPL mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Output format for results.
#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    /// JSON output
    Json,
    /// Aligned cell listing (default)
    #[default]
    Table,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .init();
    }

    let mut book = match &cli.file {
        Some(path) => Workbook::load_from_path(path)
            .with_context(|| format!("Failed to load workbook: {}", path.display()))?,
        None => {
            let mut book = Workbook::new();
            book.new_sheet(None)?;
            book
        }
    };

    for assignment in &cli.set {
        let (cell, contents) = assignment.split_once('=').with_context(|| {
            format!("Invalid assignment: '{assignment}'. Expected CELL=CONTENTS format")
        })?;
        let (sheet, location) = resolve_cell(&book, cell)?;
        book.set_cell_contents(&sheet, &location, Some(contents))?;
    }

    if cli.interactive {
        run_repl(&mut book, cli.format)?;
    } else if cli.get.is_empty() {
        print_workbook(&book, cli.format)?;
    } else {
        for cell in &cli.get {
            let (sheet, location) = resolve_cell(&book, cell)?;
            let value = book.get_cell_value(&sheet, &location)?;
            print_cell_value(&sheet, &location, &value, cli.format)?;
        }
    }

    if let Some(path) = &cli.output {
        save(&book, path)?;
    }

    Ok(())
}

/// Split `Sheet!A1` into sheet and location; a bare location uses the
/// first sheet.
fn resolve_cell(book: &Workbook, cell: &str) -> Result<(String, String)> {
    let cell = cell.trim();
    if let Some((sheet, location)) = cell.rsplit_once('!') {
        let sheet = sheet
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(sheet);
        return Ok((sheet.to_string(), location.to_string()));
    }
    match book.list_sheets().into_iter().next() {
        Some(sheet) => Ok((sheet, cell.to_string())),
        None => bail!("Workbook has no sheets; use SHEET!CELL"),
    }
}

fn save(book: &Workbook, path: &Path) -> Result<()> {
    book.save_to_path(path)
        .with_context(|| format!("Failed to save workbook: {}", path.display()))?;
    tracing::info!(path = %path.display(), "saved workbook");
    Ok(())
}

/// Run the REPL.
fn run_repl(book: &mut Workbook, format: OutputFormat) -> Result<()> {
    println!(
        "{} {} - Interactive Mode",
        "sheetcalc".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "Type {} for help, {} to exit\n",
        ":help".yellow(),
        ":quit".yellow()
    );

    book.notify_cells_changed(|book, changed| {
        for (sheet, location) in changed {
            let value = book.get_cell_value(sheet, location).unwrap_or_default();
            println!("  {} {}", format!("{sheet}!{location}").dimmed(), render(&value));
        }
    });

    let mut rl = DefaultEditor::new()?;
    let history_path = dirs_history_path();

    // Load history if available
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = "sheetcalc> ".green().bold().to_string();

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                // Add to history
                let _ = rl.add_history_entry(line);

                // Handle REPL commands
                if line.starts_with(':') {
                    match line {
                        ":quit" | ":q" | ":exit" => break,
                        ":help" | ":h" | ":?" => print_help(),
                        ":sheets" => {
                            for (idx, name) in book.list_sheets().iter().enumerate() {
                                println!("  {idx}: {name}");
                            }
                        }
                        ":clear" => print!("\x1B[2J\x1B[1;1H"),
                        _ => println!("{} Unknown command: {}", "Error:".red().bold(), line),
                    }
                    continue;
                }

                if let Err(e) = run_command(book, line, format) {
                    println!("{} {e}", "Error:".red().bold());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                println!("{} {e}", "Error:".red().bold());
                break;
            }
        }
    }

    // Save history
    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Execute one REPL statement such as `set Sheet1!A1 = 5`.
fn run_command(book: &mut Workbook, line: &str, format: OutputFormat) -> Result<()> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command.to_lowercase().as_str() {
        "set" => {
            let (cell, contents) = rest
                .split_once('=')
                .context("Usage: set CELL = CONTENTS")?;
            let (sheet, location) = resolve_cell(book, cell)?;
            let contents = contents.trim();
            book.set_cell_contents(&sheet, &location, Some(contents))?;
        }
        "clear" => {
            let (sheet, location) = resolve_cell(book, rest)?;
            book.set_cell_contents(&sheet, &location, None)?;
        }
        "get" => {
            let (sheet, location) = resolve_cell(book, rest)?;
            let value = book.get_cell_value(&sheet, &location)?;
            print_cell_value(&sheet, &location, &value, format)?;
        }
        "new" => {
            let name = (!rest.is_empty()).then_some(rest);
            let (index, name) = book.new_sheet(name)?;
            println!("Created sheet {} at index {index}", name.cyan());
        }
        "del" => book.del_sheet(rest)?,
        "copy" => {
            let (index, name) = book.copy_sheet(rest)?;
            println!("Copied to {} at index {index}", name.cyan());
        }
        "rename" => {
            let (old, new) = rest.split_once(" to ").context("Usage: rename OLD to NEW")?;
            book.rename_sheet(old.trim(), new.trim())?;
        }
        "show" => {
            if rest.is_empty() {
                print_workbook(book, format)?;
            } else {
                print_sheet(book, rest, format)?;
            }
        }
        "save" => {
            if rest.is_empty() {
                bail!("Usage: save FILE");
            }
            save(book, Path::new(rest))?;
            println!("Saved to {}", rest.cyan());
        }
        _ => bail!("Unknown statement: {command}"),
    }
    Ok(())
}

/// Get the history file path.
fn dirs_history_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|mut p| {
        p.push("sheetcalc");
        let _ = std::fs::create_dir_all(&p);
        p.push("history.txt");
        p
    })
}

fn print_workbook(book: &Workbook, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut sheets = serde_json::Map::new();
            for name in book.list_sheets() {
                sheets.insert(name.clone(), sheet_to_json(book, &name)?);
            }
            println!("{}", serde_json::to_string_pretty(&sheets)?);
        }
        OutputFormat::Table => {
            for name in book.list_sheets() {
                print_sheet(book, &name, format)?;
            }
        }
    }
    Ok(())
}

fn print_sheet(book: &Workbook, name: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sheet_to_json(book, name)?)?);
        }
        OutputFormat::Table => {
            let sheet = book.sheet(name)?;
            let (cols, rows) = sheet.extent();
            println!("{} ({cols}x{rows})", sheet.name().cyan().bold());
            let width = sheet
                .cells()
                .map(|(_, cell)| cell.contents.len())
                .max()
                .unwrap_or(0);
            for location in sheet.locations() {
                if let Some(cell) = sheet.cell(location) {
                    println!(
                        "  {:<10} {:<width$}  {}",
                        location.to_string(),
                        cell.contents,
                        render(&cell.value),
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_cell_value(
    sheet: &str,
    location: &str,
    value: &CellValue,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&value_to_json(value))?),
        OutputFormat::Table => println!("{sheet}!{location} {}", render(value)),
    }
    Ok(())
}

fn sheet_to_json(book: &Workbook, name: &str) -> Result<serde_json::Value> {
    let sheet = book.sheet(name)?;
    let cells: serde_json::Map<String, serde_json::Value> = sheet
        .locations()
        .into_iter()
        .map(|location| (location.to_string(), value_to_json(&sheet.cell_value(location))))
        .collect();
    Ok(serde_json::Value::Object(cells))
}

/// Convert a cell value to JSON; numbers keep their exact decimal text.
fn value_to_json(value: &CellValue) -> serde_json::Value {
    match value {
        CellValue::Empty => serde_json::Value::Null,
        CellValue::Number(n) => serde_json::Value::String(n.normalize().to_string()),
        CellValue::Text(s) => serde_json::Value::String(s.clone()),
        CellValue::Boolean(b) => serde_json::Value::Bool(*b),
        CellValue::Error(err) => serde_json::json!({
            "error": err.kind.label(),
            "detail": err.detail,
        }),
    }
}

/// Format a value for the terminal.
fn render(value: &CellValue) -> String {
    match value {
        CellValue::Empty => "(empty)".dimmed().to_string(),
        CellValue::Error(err) => err.to_string().red().bold().to_string(),
        CellValue::Number(_) => value.to_string().yellow().to_string(),
        _ => value.to_string(),
    }
}

fn print_help() {
    println!("{}", "sheetcalc REPL Commands:".cyan().bold());
    println!("  {}    Show this help", ":help, :h, :?".yellow());
    println!("  {}  Exit the REPL", ":quit, :q, :exit".yellow());
    println!("  {}        List sheets", ":sheets".yellow());
    println!("  {}         Clear screen", ":clear".yellow());
    println!();
    println!("{}", "Statements:".cyan().bold());
    println!("  set Sheet1!A1 = =B1*2");
    println!("  get Sheet1!A1");
    println!("  clear A1");
    println!("  new Budget");
    println!("  copy Budget");
    println!("  rename Budget to Forecast");
    println!("  del Forecast");
    println!("  show Sheet1");
    println!("  save book.json");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Workbook {
        let mut book = Workbook::new();
        book.new_sheet(Some("Data")).unwrap();
        book.new_sheet(Some("My Sheet")).unwrap();
        book
    }

    #[test]
    fn test_resolve_cell() {
        let book = book();
        assert_eq!(
            resolve_cell(&book, "Data!B2").unwrap(),
            ("Data".to_string(), "B2".to_string())
        );
        assert_eq!(
            resolve_cell(&book, "'My Sheet'!c3").unwrap(),
            ("My Sheet".to_string(), "c3".to_string())
        );
        assert_eq!(
            resolve_cell(&book, " A1 ").unwrap(),
            ("Data".to_string(), "A1".to_string())
        );
        assert!(resolve_cell(&Workbook::new(), "A1").is_err());
    }

    #[test]
    fn test_run_command_statements() {
        let mut book = book();
        run_command(&mut book, "set Data!A1 = 4", OutputFormat::Table).unwrap();
        run_command(&mut book, "set B1 = =A1 * 2", OutputFormat::Table).unwrap();
        assert_eq!(
            book.get_cell_value("Data", "B1").unwrap(),
            CellValue::from(8_i64)
        );

        run_command(&mut book, "rename Data to Input", OutputFormat::Table).unwrap();
        assert_eq!(book.list_sheets(), vec!["Input", "My Sheet"]);

        run_command(&mut book, "clear Input!A1", OutputFormat::Table).unwrap();
        assert_eq!(
            book.get_cell_value("Input", "B1").unwrap(),
            CellValue::from(0_i64)
        );

        assert!(run_command(&mut book, "frobnicate", OutputFormat::Table).is_err());
        assert!(run_command(&mut book, "set nothing", OutputFormat::Table).is_err());
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(value_to_json(&CellValue::Empty), serde_json::Value::Null);
        assert_eq!(
            value_to_json(&CellValue::from(5_i64)),
            serde_json::json!("5")
        );
        let err = value_to_json(&CellValue::error(sheetcalc_sheet::ErrorKind::DivideByZero));
        assert_eq!(err["error"], "#DIV/0!");
    }
}
