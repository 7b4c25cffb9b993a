use crate::config::WorkbookConfig;
use crate::error::{Result, WorkbookError};
use crate::sheet::{Cell, Sheet};
use indexmap::{IndexMap, IndexSet};
use sheetcalc_dag::{DependencyGraph, RecalcPlan};
use sheetcalc_formulas::{
    is_formula, rename_sheet_in_formula, shift_formula, FormulaEngine, FormulaExpr, ValueResolver,
};
use sheetcalc_primitives::{CellError, CellKey, CellLocation, CellValue, ErrorKind};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};

/// Punctuation allowed in sheet names besides letters and digits.
const SHEET_NAME_PUNCTUATION: &str = " .?!,:;@#$%^&*()-_";

/// Upper bound on recalculation passes caused by INDIRECT rewiring edges.
const MAX_REWIRE_PASSES: usize = 16;

/// A changed cell as reported to listeners: sheet display name and
/// upper-case location.
pub type ChangedCell = (String, String);

/// Callback invoked once per workbook mutation that changed any value.
pub type ChangeListener = Box<dyn Fn(&Workbook, &[ChangedCell])>;

/// A workbook of named sheets with automatic recalculation
///
/// Sheets keep their insertion order and are looked up case-insensitively.
/// Every public mutation runs to completion: contents are stored, the
/// dependency graph is updated, every affected formula is re-evaluated and
/// listeners are told which values changed.
pub struct Workbook {
    config: WorkbookConfig,
    /// Sheets keyed by lower-cased name
    sheets: IndexMap<String, Sheet>,
    engine: FormulaEngine,
    graph: DependencyGraph,
    listeners: Vec<ChangeListener>,
    /// Cells reported to listeners after the current mutation
    changed: IndexSet<CellKey>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Create a new empty workbook
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorkbookConfig::default())
    }

    /// Create a new empty workbook with custom options
    #[must_use]
    pub fn with_config(config: WorkbookConfig) -> Self {
        let engine = FormulaEngine::with_cache_limit(config.parse_cache_limit)
            .with_max_range_cells(config.max_range_cells);
        Workbook {
            config,
            sheets: IndexMap::new(),
            engine,
            graph: DependencyGraph::new(),
            listeners: Vec::new(),
            changed: IndexSet::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WorkbookConfig {
        &self.config
    }

    /// Get the number of sheets
    #[must_use]
    pub fn num_sheets(&self) -> usize {
        self.sheets.len()
    }

    /// Sheet display names in workbook order
    #[must_use]
    pub fn list_sheets(&self) -> Vec<String> {
        self.sheets.values().map(|s| s.name().to_string()).collect()
    }

    /// Get a sheet by name (case-insensitive)
    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .get(&name.to_lowercase())
            .ok_or_else(|| WorkbookError::SheetNotFound {
                name: name.to_string(),
            })
    }

    /// Number of edges in the dependency graph.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    // ===== Sheet Management =====

    /// Add a sheet, generating a `SheetN` name when `name` is `None`.
    ///
    /// Returns the 0-based index of the new sheet and its name. Formulas
    /// that were waiting on a sheet of this name are recalculated.
    pub fn new_sheet(&mut self, name: Option<&str>) -> Result<(usize, String)> {
        let name = match name {
            Some(name) => {
                validate_sheet_name(name)?;
                name.to_string()
            }
            None => self.generate_sheet_name(),
        };
        let key = name.to_lowercase();
        if self.sheets.contains_key(&key) {
            return Err(WorkbookError::SheetAlreadyExists { name });
        }

        self.begin_mutation();
        self.sheets.insert(key.clone(), Sheet::with_name(&name));
        let index = self.sheets.len() - 1;
        tracing::debug!(sheet = %name, index, "created sheet");

        let waiting = self.graph.dependents_on_sheet(&key);
        self.recalculate(waiting);
        self.flush_changes();
        Ok((index, name))
    }

    /// Delete a sheet; formulas that read it become `#REF!`.
    pub fn del_sheet(&mut self, name: &str) -> Result<()> {
        let key = self.sheet_key(name)?;

        self.begin_mutation();
        self.sheets.shift_remove(&key);
        self.graph.remove_sheet(&key);
        tracing::debug!(sheet = %name, "deleted sheet");

        let waiting = self.graph.dependents_on_sheet(&key);
        self.recalculate(waiting);
        self.flush_changes();
        Ok(())
    }

    /// `(columns, rows)` spanned by the sheet's non-empty cells.
    pub fn get_sheet_extent(&self, name: &str) -> Result<(u32, u32)> {
        Ok(self.sheet(name)?.extent())
    }

    /// Rename a sheet, keeping its position.
    ///
    /// Every formula that mentions the old name is rewritten to the new one,
    /// and formulas that were waiting on the new name are recalculated.
    pub fn rename_sheet(&mut self, name: &str, new_name: &str) -> Result<()> {
        let old_key = self.sheet_key(name)?;
        validate_sheet_name(new_name)?;
        let new_key = new_name.to_lowercase();
        if new_key != old_key && self.sheets.contains_key(&new_key) {
            return Err(WorkbookError::SheetAlreadyExists {
                name: new_name.to_string(),
            });
        }

        self.begin_mutation();
        if let Some(index) = self.sheets.get_index_of(&old_key) {
            if let Some((_, mut sheet)) = self.sheets.shift_remove_index(index) {
                sheet.set_name(new_name);
                self.sheets.shift_insert(index, new_key.clone(), sheet);
            }
        }
        self.graph.rename_sheet(&old_key, &new_key);

        let mut rewritten = Vec::new();
        for (sheet_key, sheet) in &self.sheets {
            for (location, cell) in sheet.cells() {
                if !is_formula(&cell.contents) {
                    continue;
                }
                if let Some(text) = rename_sheet_in_formula(&cell.contents, name, new_name) {
                    rewritten.push((
                        CellKey {
                            sheet: sheet_key.clone(),
                            location,
                        },
                        text,
                    ));
                }
            }
        }
        tracing::debug!(
            old = %name,
            new = %new_name,
            formulas = rewritten.len(),
            "renamed sheet"
        );

        let mut roots = self.graph.dependents_on_sheet(&new_key);
        for (key, text) in rewritten {
            self.store_contents(&key, Some(&text));
            roots.push(key);
        }
        self.recalculate(roots);
        self.flush_changes();
        Ok(())
    }

    /// Move a sheet to a new 0-based position. No values change.
    pub fn move_sheet(&mut self, name: &str, index: usize) -> Result<()> {
        let key = self.sheet_key(name)?;
        if index >= self.sheets.len() {
            return Err(WorkbookError::SheetIndexOutOfRange {
                index,
                count: self.sheets.len(),
            });
        }

        self.begin_mutation();
        if let Some(from) = self.sheets.get_index_of(&key) {
            self.sheets.move_index(from, index);
        }
        self.flush_changes();
        Ok(())
    }

    /// Append a copy of a sheet named `{name}_{n}` with the smallest free n.
    ///
    /// Returns the index and name of the copy.
    pub fn copy_sheet(&mut self, name: &str) -> Result<(usize, String)> {
        let key = self.sheet_key(name)?;
        let (copy_name, contents) = {
            let source = self.sheet(&key)?;
            let mut n = 1;
            let copy_name = loop {
                let candidate = format!("{}_{}", source.name(), n);
                if !self.sheets.contains_key(&candidate.to_lowercase()) {
                    break candidate;
                }
                n += 1;
            };
            let contents: Vec<(CellLocation, String)> = source
                .locations()
                .into_iter()
                .filter_map(|loc| source.cell_contents(loc).map(|c| (loc, c.to_string())))
                .collect();
            (copy_name, contents)
        };
        let copy_key = copy_name.to_lowercase();

        self.begin_mutation();
        self.sheets
            .insert(copy_key.clone(), Sheet::with_name(&copy_name));
        let index = self.sheets.len() - 1;
        tracing::debug!(source = %name, copy = %copy_name, cells = contents.len(), "copied sheet");

        let mut roots = self.graph.dependents_on_sheet(&copy_key);
        for (location, text) in contents {
            let cell = CellKey {
                sheet: copy_key.clone(),
                location,
            };
            self.store_contents(&cell, Some(&text));
            roots.push(cell);
        }
        self.recalculate(roots);
        self.flush_changes();
        Ok((index, copy_name))
    }

    // ===== Cell Access =====

    /// Set a cell's contents; `None` or blank text empties the cell.
    ///
    /// The cell itself is reported as changed when its stored text changes,
    /// even if its value does not.
    ///
    /// Formula problems are not errors here: they are stored as error
    /// values in the cell.
    pub fn set_cell_contents(
        &mut self,
        sheet: &str,
        location: &str,
        contents: Option<&str>,
    ) -> Result<()> {
        let key = CellKey {
            sheet: self.sheet_key(sheet)?,
            location: parse_location(location)?,
        };

        self.begin_mutation();
        let before = self.stored_contents(&key);
        self.store_contents(&key, contents);
        if self.stored_contents(&key) != before {
            self.changed.insert(key.clone());
        }
        self.recalculate(vec![key]);
        self.flush_changes();
        Ok(())
    }

    /// Trimmed contents of a cell, `None` when empty.
    pub fn get_cell_contents(&self, sheet: &str, location: &str) -> Result<Option<String>> {
        let location = parse_location(location)?;
        Ok(self
            .sheet(sheet)?
            .cell_contents(location)
            .map(str::to_string))
    }

    /// Computed value of a cell, `CellValue::Empty` when empty.
    pub fn get_cell_value(&self, sheet: &str, location: &str) -> Result<CellValue> {
        let location = parse_location(location)?;
        Ok(self.sheet(sheet)?.cell_value(location))
    }

    // ===== Regions =====

    /// Move the cells of a rectangle so its top-left corner lands on `to`.
    ///
    /// Relative references in moved formulas shift with the cells. Source
    /// cells outside the target rectangle are emptied.
    pub fn move_cells(
        &mut self,
        sheet: &str,
        start: &str,
        end: &str,
        to: &str,
        to_sheet: Option<&str>,
    ) -> Result<()> {
        self.relocate_cells(sheet, start, end, to, to_sheet, false)
    }

    /// Copy the cells of a rectangle so its top-left corner lands on `to`.
    pub fn copy_cells(
        &mut self,
        sheet: &str,
        start: &str,
        end: &str,
        to: &str,
        to_sheet: Option<&str>,
    ) -> Result<()> {
        self.relocate_cells(sheet, start, end, to, to_sheet, true)
    }

    fn relocate_cells(
        &mut self,
        sheet: &str,
        start: &str,
        end: &str,
        to: &str,
        to_sheet: Option<&str>,
        keep_source: bool,
    ) -> Result<()> {
        let source_key = self.sheet_key(sheet)?;
        let target_key = match to_sheet {
            Some(name) => self.sheet_key(name)?,
            None => source_key.clone(),
        };
        let source = Region::new(parse_location(start)?, parse_location(end)?);
        let to = parse_location(to)?;
        let d_col = i64::from(to.col) - i64::from(source.left);
        let d_row = i64::from(to.row) - i64::from(source.top);
        let target = source
            .shifted(d_col, d_row)
            .ok_or_else(|| WorkbookError::RegionOutOfBounds {
                location: to.to_string(),
            })?;

        // Stage everything before writing so overlapping rectangles read the
        // original contents. Clears go in first; copied contents overwrite.
        let mut staged: BTreeMap<CellKey, Option<String>> = BTreeMap::new();
        if !keep_source {
            for location in self.sheet(&source_key)?.locations() {
                if source.contains(location) {
                    staged.insert(key_at(&source_key, location), None);
                }
            }
        }
        for location in self.sheet(&target_key)?.locations() {
            if target.contains(location) {
                staged.insert(key_at(&target_key, location), None);
            }
        }
        let source_sheet = self.sheet(&source_key)?;
        for location in source_sheet.locations() {
            if !source.contains(location) {
                continue;
            }
            let (Some(text), Some(dest)) = (
                source_sheet.cell_contents(location),
                location.offset(d_col, d_row),
            ) else {
                continue;
            };
            let text = if is_formula(text) {
                shift_formula(text, d_col, d_row)
            } else {
                text.to_string()
            };
            staged.insert(key_at(&target_key, dest), Some(text));
        }

        self.begin_mutation();
        tracing::debug!(
            sheet = %sheet,
            cells = staged.len(),
            keep_source,
            "relocating cells"
        );
        self.apply_staged(staged);
        self.flush_changes();
        Ok(())
    }

    /// Sort the rows of a rectangle by the given 1-based columns within it.
    ///
    /// A negative column sorts that column descending. The sort is stable,
    /// and formulas in moved rows shift by the distance their row moved.
    pub fn sort_region(
        &mut self,
        sheet: &str,
        start: &str,
        end: &str,
        sort_cols: &[i32],
    ) -> Result<()> {
        let key = self.sheet_key(sheet)?;
        let region = Region::new(parse_location(start)?, parse_location(end)?);
        let width = region.right - region.left + 1;

        let mut seen = HashSet::new();
        let valid = !sort_cols.is_empty()
            && sort_cols.iter().all(|c| {
                let column = c.unsigned_abs();
                column != 0 && column <= width && seen.insert(column)
            });
        if !valid {
            return Err(WorkbookError::InvalidSortColumns {
                columns: sort_cols.to_vec(),
                width,
            });
        }

        let source = self.sheet(&key)?;
        let mut rows: Vec<(u32, Vec<CellValue>)> = (region.top..=region.bottom)
            .map(|row| {
                let values = sort_cols
                    .iter()
                    .map(|c| {
                        source.cell_value(CellLocation::new(region.left + c.unsigned_abs() - 1, row))
                    })
                    .collect();
                (row, values)
            })
            .collect();
        rows.sort_by(|a, b| compare_rows(&a.1, &b.1, sort_cols));

        let moves: BTreeMap<u32, u32> = rows
            .iter()
            .zip(region.top..)
            .filter(|((old, _), new)| old != new)
            .map(|((old, _), new)| (*old, new))
            .collect();

        let mut staged: BTreeMap<CellKey, Option<String>> = BTreeMap::new();
        let occupied: Vec<CellLocation> = source
            .locations()
            .into_iter()
            .filter(|loc| region.contains(*loc) && moves.contains_key(&loc.row))
            .collect();
        for location in &occupied {
            staged.insert(key_at(&key, *location), None);
        }
        for location in occupied {
            let (Some(text), Some(new_row)) =
                (source.cell_contents(location), moves.get(&location.row))
            else {
                continue;
            };
            let d_row = i64::from(*new_row) - i64::from(location.row);
            let text = if is_formula(text) {
                shift_formula(text, 0, d_row)
            } else {
                text.to_string()
            };
            staged.insert(
                key_at(&key, CellLocation::new(location.col, *new_row)),
                Some(text),
            );
        }

        self.begin_mutation();
        tracing::debug!(sheet = %sheet, rows = moves.len(), "sorted region");
        self.apply_staged(staged);
        self.flush_changes();
        Ok(())
    }

    // ===== Notification =====

    /// Register a listener called after each mutation that changed values.
    ///
    /// Registering the same function twice makes it run twice per change.
    pub fn notify_cells_changed<F>(&mut self, listener: F)
    where
        F: Fn(&Workbook, &[ChangedCell]) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn begin_mutation(&mut self) {
        self.changed.clear();
    }

    fn flush_changes(&mut self) {
        let keys = std::mem::take(&mut self.changed);
        let changed: Vec<ChangedCell> = keys
            .into_iter()
            .filter_map(|key| {
                self.sheets
                    .get(&key.sheet)
                    .map(|sheet| (sheet.name().to_string(), key.location.to_string()))
            })
            .collect();
        if changed.is_empty() {
            return;
        }

        let book: &Workbook = self;
        for (index, listener) in book.listeners.iter().enumerate() {
            if book.config.isolate_listener_panics {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| listener(book, changed.as_slice())));
                if outcome.is_err() {
                    tracing::warn!(listener = index, "change listener panicked");
                }
            } else {
                listener(book, changed.as_slice());
            }
        }
    }

    // ===== Recalculation =====

    fn sheet_key(&self, name: &str) -> Result<String> {
        let key = name.to_lowercase();
        if self.sheets.contains_key(&key) {
            Ok(key)
        } else {
            Err(WorkbookError::SheetNotFound {
                name: name.to_string(),
            })
        }
    }

    fn generate_sheet_name(&self) -> String {
        let mut n = 1;
        loop {
            let candidate = format!("Sheet{}", n);
            if !self.sheets.contains_key(&candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn apply_staged(&mut self, staged: BTreeMap<CellKey, Option<String>>) {
        let roots: Vec<CellKey> = staged.keys().cloned().collect();
        for (key, contents) in staged {
            self.store_contents(&key, contents.as_deref());
        }
        self.recalculate(roots);
    }

    fn stored_contents(&self, key: &CellKey) -> Option<String> {
        self.sheets
            .get(&key.sheet)
            .and_then(|sheet| sheet.cell_contents(key.location))
            .map(str::to_string)
    }

    /// Store new contents and rewire the cell's precedents.
    ///
    /// Literal values are final here. A formula keeps its previous value
    /// until [`Self::recalculate`] evaluates it.
    fn store_contents(&mut self, key: &CellKey, contents: Option<&str>) {
        let Some(sheet) = self.sheets.get(&key.sheet) else {
            return;
        };
        let previous = sheet.cell_value(key.location);
        let contents = contents.map(str::trim).filter(|text| !text.is_empty());

        let Some(text) = contents else {
            self.graph.clear_precedents(key);
            if let Some(sheet) = self.sheets.get_mut(&key.sheet) {
                sheet.remove_cell(key.location);
            }
            self.note_change(key, &previous, &CellValue::Empty);
            return;
        };

        let cell = if is_formula(text) {
            match self.engine.parse(text) {
                Ok(expr) => {
                    let precedents = self.engine.references(&expr, &key.sheet);
                    self.graph.set_precedents(key, precedents);
                    Cell::formula(text, previous.clone(), expr)
                }
                Err(err) => {
                    tracing::debug!(cell = %key, error = %err, "formula failed to parse");
                    self.graph.clear_precedents(key);
                    Cell::literal(text, CellValue::Error(err.into()))
                }
            }
        } else {
            self.graph.clear_precedents(key);
            Cell::literal(text, CellValue::parse_literal(text))
        };

        let value = cell.value.clone();
        if let Some(sheet) = self.sheets.get_mut(&key.sheet) {
            sheet.set_cell(key.location, cell);
        }
        self.note_change(key, &previous, &value);
    }

    /// Re-evaluate the roots and everything downstream of them.
    fn recalculate(&mut self, roots: Vec<CellKey>) {
        let mut roots = roots;
        for _ in 0..MAX_REWIRE_PASSES {
            if roots.is_empty() {
                return;
            }
            let plan = self.graph.plan_recalculation(&roots);
            if !plan.circular.is_empty() {
                tracing::debug!(cells = plan.circular.len(), "circular references detected");
            }
            tracing::debug!(cells = plan.order.len(), "recalculating");
            roots = self.replay(&plan);
        }
        if !roots.is_empty() {
            tracing::warn!(
                cells = roots.len(),
                "dynamic references kept changing; recalculation stopped"
            );
        }
    }

    /// Evaluate the planned cells in order and commit their values.
    ///
    /// Returns the cells whose INDIRECT targets changed their precedents;
    /// those need another planning pass.
    fn replay(&mut self, plan: &RecalcPlan) -> Vec<CellKey> {
        let mut rewired = Vec::new();
        for key in &plan.order {
            let Some(expr) = self
                .sheets
                .get(&key.sheet)
                .and_then(|sheet| sheet.cell(key.location))
                .and_then(|cell| cell.formula.clone())
            else {
                continue;
            };

            let (value, circular) = if plan.is_circular(key) {
                let err = CellError::with_detail(
                    ErrorKind::CircularReference,
                    "Cell is part of a circular reference.",
                );
                (CellValue::Error(err), true)
            } else {
                let resolver = SheetResolver {
                    sheets: &self.sheets,
                };
                let in_cycle = self.graph.precedents(key).any(|p| resolver.is_circular(p));
                let evaluation = self.engine.evaluate(&expr, &key.sheet, &resolver, in_cycle);
                if expr.contains_call("indirect")
                    && self.rewire(key, &expr, &evaluation.dynamic_references)
                {
                    rewired.push(key.clone());
                }
                let circular = in_cycle
                    && evaluation.value.error_kind() == Some(ErrorKind::CircularReference);
                (evaluation.value, circular)
            };
            self.commit_value(key, value, circular);
        }
        rewired
    }

    /// Make a formula's precedents its static references plus the ones it
    /// resolved dynamically. Returns whether the edges changed.
    fn rewire(&mut self, key: &CellKey, expr: &FormulaExpr, dynamic: &[CellKey]) -> bool {
        let mut wanted: BTreeSet<CellKey> =
            self.engine.references(expr, &key.sheet).into_iter().collect();
        wanted.extend(dynamic.iter().cloned());
        let current: BTreeSet<CellKey> = self.graph.precedents(key).cloned().collect();
        if wanted == current {
            return false;
        }
        self.graph.set_precedents(key, wanted);
        true
    }

    fn commit_value(&mut self, key: &CellKey, value: CellValue, circular: bool) {
        let Some(sheet) = self.sheets.get_mut(&key.sheet) else {
            return;
        };
        let previous = sheet.cell_value(key.location);
        let changed = value_changed(&previous, &value);
        sheet.set_cell_value(key.location, value, circular);
        if changed {
            self.changed.insert(key.clone());
        }
    }

    fn note_change(&mut self, key: &CellKey, previous: &CellValue, current: &CellValue) {
        if value_changed(previous, current) {
            self.changed.insert(key.clone());
        }
    }
}

/// Resolves formula references against the workbook's sheets.
struct SheetResolver<'a> {
    sheets: &'a IndexMap<String, Sheet>,
}

impl SheetResolver<'_> {
    /// Whether a precedent carries a circular reference from a real cycle.
    fn is_circular(&self, key: &CellKey) -> bool {
        self.sheets
            .get(&key.sheet)
            .is_some_and(|sheet| sheet.is_circular(key.location))
    }
}

impl ValueResolver for SheetResolver<'_> {
    fn sheet_exists(&self, sheet: &str) -> bool {
        self.sheets.contains_key(&sheet.to_lowercase())
    }

    fn cell_value(&self, sheet: &str, location: CellLocation) -> CellValue {
        self.sheets
            .get(&sheet.to_lowercase())
            .map(|s| s.cell_value(location))
            .unwrap_or_default()
    }
}

/// Errors of the same kind count as unchanged even if their details differ.
fn value_changed(previous: &CellValue, current: &CellValue) -> bool {
    match (previous, current) {
        (CellValue::Error(a), CellValue::Error(b)) => a.kind != b.kind,
        _ => previous != current,
    }
}

fn key_at(sheet: &str, location: CellLocation) -> CellKey {
    CellKey {
        sheet: sheet.to_string(),
        location,
    }
}

fn parse_location(text: &str) -> Result<CellLocation> {
    CellLocation::parse(text).map_err(|_| {
        tracing::debug!(location = %text, "rejected cell location");
        WorkbookError::InvalidLocation {
            location: text.to_string(),
        }
    })
}

fn validate_sheet_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(char::is_whitespace)
        && !name.ends_with(char::is_whitespace)
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || SHEET_NAME_PUNCTUATION.contains(c));
    if valid {
        Ok(())
    } else {
        tracing::debug!(name = %name, "rejected sheet name");
        Err(WorkbookError::InvalidSheetName {
            name: name.to_string(),
        })
    }
}

fn compare_rows(a: &[CellValue], b: &[CellValue], sort_cols: &[i32]) -> Ordering {
    for ((left, right), column) in a.iter().zip(b).zip(sort_cols) {
        let ordering = left.sort_cmp(right);
        let ordering = if *column < 0 {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// An inclusive rectangle of cells with normalized corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl Region {
    fn new(a: CellLocation, b: CellLocation) -> Self {
        Region {
            left: a.col.min(b.col),
            top: a.row.min(b.row),
            right: a.col.max(b.col),
            bottom: a.row.max(b.row),
        }
    }

    fn contains(&self, location: CellLocation) -> bool {
        (self.left..=self.right).contains(&location.col)
            && (self.top..=self.bottom).contains(&location.row)
    }

    /// The region moved by a delta, or `None` if any corner leaves the grid.
    fn shifted(&self, d_col: i64, d_row: i64) -> Option<Self> {
        let top_left = CellLocation::new(self.left, self.top).offset(d_col, d_row)?;
        let bottom_right = CellLocation::new(self.right, self.bottom).offset(d_col, d_row)?;
        Some(Region::new(top_left, bottom_right))
    }
}
