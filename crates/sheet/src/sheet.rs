use sheetcalc_formulas::FormulaExpr;
use sheetcalc_primitives::{CellLocation, CellValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A single non-empty cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Contents as entered, trimmed
    pub contents: String,
    /// Last computed value
    pub value: CellValue,
    /// Parsed formula; `None` for literals and formulas that failed to parse
    pub formula: Option<Arc<FormulaExpr>>,
    /// Set when the value is a circular reference error caused by a real
    /// cycle, either as a member or downstream of one
    pub circular: bool,
}

impl Cell {
    #[must_use]
    pub fn literal(contents: &str, value: CellValue) -> Self {
        Cell {
            contents: contents.to_string(),
            value,
            formula: None,
            circular: false,
        }
    }

    #[must_use]
    pub fn formula(contents: &str, value: CellValue, formula: Arc<FormulaExpr>) -> Self {
        Cell {
            contents: contents.to_string(),
            value,
            formula: Some(formula),
            circular: false,
        }
    }
}

/// A named sheet of sparse cells
///
/// Only non-empty cells are stored. The extent is maintained from per-column
/// and per-row occupancy counts, so removing the last cell of the outermost
/// row or column shrinks it.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    cells: HashMap<CellLocation, Cell>,
    columns: BTreeMap<u32, usize>,
    rows: BTreeMap<u32, usize>,
}

impl Sheet {
    /// Create a new empty sheet with a display name
    #[must_use]
    pub fn with_name(name: &str) -> Self {
        Sheet {
            name: name.to_string(),
            cells: HashMap::new(),
            columns: BTreeMap::new(),
            rows: BTreeMap::new(),
        }
    }

    /// Get the sheet display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sheet display name
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Number of non-empty cells
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    // ===== Cell Access =====

    #[must_use]
    pub fn cell(&self, location: CellLocation) -> Option<&Cell> {
        self.cells.get(&location)
    }

    #[must_use]
    pub fn cell_contents(&self, location: CellLocation) -> Option<&str> {
        self.cells.get(&location).map(|cell| cell.contents.as_str())
    }

    /// Value of a cell; empty cells are `CellValue::Empty`.
    #[must_use]
    pub fn cell_value(&self, location: CellLocation) -> CellValue {
        self.cells
            .get(&location)
            .map(|cell| cell.value.clone())
            .unwrap_or_default()
    }

    /// Iterate over the non-empty cells in no particular order
    pub fn cells(&self) -> impl Iterator<Item = (CellLocation, &Cell)> + '_ {
        self.cells.iter().map(|(location, cell)| (*location, cell))
    }

    /// Locations of the non-empty cells, row by row.
    #[must_use]
    pub fn locations(&self) -> Vec<CellLocation> {
        let mut locations: Vec<CellLocation> = self.cells.keys().copied().collect();
        locations.sort_by_key(|location| (location.row, location.col));
        locations
    }

    // ===== Mutation =====

    /// Store a cell, returning the one it replaced.
    pub fn set_cell(&mut self, location: CellLocation, cell: Cell) -> Option<Cell> {
        let previous = self.cells.insert(location, cell);
        if previous.is_none() {
            *self.columns.entry(location.col).or_insert(0) += 1;
            *self.rows.entry(location.row).or_insert(0) += 1;
        }
        previous
    }

    /// Replace the computed value of an existing cell.
    ///
    /// Returns `false` if there is no cell at `location`.
    /// Store a computed value and whether it comes from a real cycle.
    pub fn set_cell_value(
        &mut self,
        location: CellLocation,
        value: CellValue,
        circular: bool,
    ) -> bool {
        match self.cells.get_mut(&location) {
            Some(cell) => {
                cell.value = value;
                cell.circular = circular;
                true
            }
            None => false,
        }
    }

    /// Whether the cell's value comes from a real cycle.
    pub fn is_circular(&self, location: CellLocation) -> bool {
        self.cells.get(&location).is_some_and(|cell| cell.circular)
    }

    pub fn remove_cell(&mut self, location: CellLocation) -> Option<Cell> {
        let removed = self.cells.remove(&location)?;
        release(&mut self.columns, location.col);
        release(&mut self.rows, location.row);
        Some(removed)
    }

    /// `(columns, rows)` spanned by non-empty cells, `(0, 0)` when empty.
    #[must_use]
    pub fn extent(&self) -> (u32, u32) {
        let cols = self.columns.keys().next_back().copied().unwrap_or(0);
        let rows = self.rows.keys().next_back().copied().unwrap_or(0);
        (cols, rows)
    }
}

fn release(counts: &mut BTreeMap<u32, usize>, index: u32) {
    if let Some(count) = counts.get_mut(&index) {
        *count -= 1;
        if *count == 0 {
            counts.remove(&index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcalc_primitives::ErrorKind;

    fn loc(text: &str) -> CellLocation {
        CellLocation::parse(text).unwrap()
    }

    fn text_cell(text: &str) -> Cell {
        Cell::literal(text, CellValue::Text(text.to_string()))
    }

    #[test]
    fn test_empty_sheet() {
        let sheet = Sheet::with_name("Data");
        assert_eq!(sheet.name(), "Data");
        assert!(sheet.is_empty());
        assert_eq!(sheet.extent(), (0, 0));
        assert_eq!(sheet.cell_value(loc("A1")), CellValue::Empty);
        assert_eq!(sheet.cell_contents(loc("A1")), None);
    }

    #[test]
    fn test_extent_grows_and_shrinks() {
        let mut sheet = Sheet::with_name("Data");
        sheet.set_cell(loc("D14"), text_cell("x"));
        assert_eq!(sheet.extent(), (4, 14));

        sheet.set_cell(loc("B20"), text_cell("y"));
        sheet.set_cell(loc("B3"), text_cell("z"));
        assert_eq!(sheet.extent(), (4, 20));

        sheet.remove_cell(loc("B20"));
        assert_eq!(sheet.extent(), (4, 14));
        sheet.remove_cell(loc("D14"));
        assert_eq!(sheet.extent(), (2, 3));
        sheet.remove_cell(loc("B3"));
        assert_eq!(sheet.extent(), (0, 0));
    }

    #[test]
    fn test_replacing_a_cell_keeps_counts() {
        let mut sheet = Sheet::with_name("Data");
        sheet.set_cell(loc("C3"), text_cell("a"));
        let previous = sheet.set_cell(loc("C3"), text_cell("b"));
        assert_eq!(previous.map(|c| c.contents), Some("a".to_string()));
        assert_eq!(sheet.len(), 1);

        sheet.remove_cell(loc("C3"));
        assert_eq!(sheet.extent(), (0, 0));
        assert!(sheet.remove_cell(loc("C3")).is_none());
    }

    #[test]
    fn test_set_cell_value_requires_cell() {
        let mut sheet = Sheet::with_name("Data");
        assert!(!sheet.set_cell_value(loc("A1"), CellValue::from(1_i64), false));
        sheet.set_cell(loc("A1"), text_cell("a"));
        assert!(sheet.set_cell_value(loc("A1"), CellValue::from(1_i64), false));
        assert_eq!(sheet.cell_value(loc("A1")), CellValue::from(1_i64));
        assert!(!sheet.is_circular(loc("A1")));

        let circref = CellValue::error(ErrorKind::CircularReference);
        assert!(sheet.set_cell_value(loc("A1"), circref, true));
        assert!(sheet.is_circular(loc("A1")));
        sheet.set_cell(loc("A1"), text_cell("b"));
        assert!(!sheet.is_circular(loc("A1")));
    }

    #[test]
    fn test_locations_are_row_major() {
        let mut sheet = Sheet::with_name("Data");
        for text in ["B2", "A2", "C1"] {
            sheet.set_cell(loc(text), text_cell(text));
        }
        assert_eq!(sheet.locations(), vec![loc("C1"), loc("A2"), loc("B2")]);
    }
}
