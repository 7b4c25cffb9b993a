/// Workbook tuning options
#[derive(Debug, Clone)]
pub struct WorkbookConfig {
    /// Distinct formula texts kept in the parse cache before it is cleared
    /// (default: 4096)
    pub parse_cache_limit: usize,
    /// Largest number of cells a single range reference may cover; larger
    /// ranges evaluate to `#REF!` (default: unbounded)
    pub max_range_cells: u64,
    /// Catch and log panics raised by change listeners (default: true)
    pub isolate_listener_panics: bool,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        WorkbookConfig {
            parse_cache_limit: 4096,
            max_range_cells: sheetcalc_formulas::DEFAULT_MAX_RANGE_CELLS,
            isolate_listener_panics: true,
        }
    }
}

impl WorkbookConfig {
    /// Set the parse cache limit
    #[must_use]
    pub fn with_parse_cache_limit(mut self, limit: usize) -> Self {
        self.parse_cache_limit = limit;
        self
    }

    /// Set the range size cap
    #[must_use]
    pub fn with_max_range_cells(mut self, cells: u64) -> Self {
        self.max_range_cells = cells;
        self
    }

    /// Set whether listener panics are caught
    #[must_use]
    pub fn with_listener_isolation(mut self, isolate: bool) -> Self {
        self.isolate_listener_panics = isolate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = WorkbookConfig::default();
        assert_eq!(config.parse_cache_limit, 4096);
        assert_eq!(config.max_range_cells, u64::MAX);
        assert!(config.isolate_listener_panics);

        let config = WorkbookConfig::default()
            .with_parse_cache_limit(8)
            .with_max_range_cells(50)
            .with_listener_isolation(false);
        assert_eq!(config.parse_cache_limit, 8);
        assert_eq!(config.max_range_cells, 50);
        assert!(!config.isolate_listener_panics);
    }
}
