//! # sheetcalc formulas
//!
//! Formula parsing, evaluation and reference rewriting.
//! Includes the function registry for the built-in functions (SUM, IF,
//! VLOOKUP, INDIRECT, ...).

use rust_decimal::Decimal;
use sheetcalc_primitives::{CellError, CellKey, CellLocation, CellReference, CellValue, ErrorKind};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

pub mod functions;
pub mod parser;
pub mod refs;

pub use parser::{parse_formula, parse_reference};
pub use refs::{rename_sheet_in_formula, shift_formula};

/// Default upper bound on the number of cells a single range may cover.
/// Ranges are unbounded unless a smaller cap is configured.
pub const DEFAULT_MAX_RANGE_CELLS: u64 = u64::MAX;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    /// Number, string or boolean literal
    Literal(CellValue),
    /// Error literal such as `#REF!`
    ErrorLiteral(ErrorKind),
    /// Cell reference, optionally sheet-qualified
    CellRef {
        sheet: Option<String>,
        reference: CellReference,
    },
    /// Range reference; corners may be given in any order
    RangeRef {
        sheet: Option<String>,
        start: CellReference,
        end: CellReference,
    },
    /// Function call
    FunctionCall {
        name: String,
        args: Vec<FormulaExpr>,
    },
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        expr: Box<FormulaExpr>,
    },
}

impl FormulaExpr {
    pub fn binary(op: BinaryOperator, left: FormulaExpr, right: FormulaExpr) -> Self {
        Self::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// True if the tree calls `name` anywhere (case-insensitive).
    pub fn contains_call(&self, name: &str) -> bool {
        match self {
            Self::FunctionCall { name: called, args } => {
                called.eq_ignore_ascii_case(name) || args.iter().any(|a| a.contains_call(name))
            }
            Self::BinaryOp { left, right, .. } => {
                left.contains_call(name) || right.contains_call(name)
            }
            Self::UnaryOp { expr, .. } => expr.contains_call(name),
            _ => false,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Negate,
}

/// True when cell text should be treated as a formula.
pub fn is_formula(contents: &str) -> bool {
    contents.trim_start().starts_with('=')
}

/// Source of cell values during evaluation.
///
/// Sheet names are passed as written in the formula; implementations match
/// them case-insensitively.
pub trait ValueResolver {
    fn sheet_exists(&self, sheet: &str) -> bool;
    fn cell_value(&self, sheet: &str, location: CellLocation) -> CellValue;
}

/// In-memory resolver backed by a map, handy for evaluating formulas
/// outside a workbook.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    sheets: HashSet<String>,
    cells: HashMap<CellKey, CellValue>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: &str) -> Self {
        self.sheets.insert(sheet.to_lowercase());
        self
    }

    /// Store a value, creating the sheet if needed.
    pub fn set(&mut self, sheet: &str, location: CellLocation, value: CellValue) {
        self.sheets.insert(sheet.to_lowercase());
        self.cells.insert(CellKey::new(sheet, location), value);
    }
}

impl ValueResolver for MapResolver {
    fn sheet_exists(&self, sheet: &str) -> bool {
        self.sheets.contains(&sheet.to_lowercase())
    }

    fn cell_value(&self, sheet: &str, location: CellLocation) -> CellValue {
        self.cells
            .get(&CellKey::new(sheet, location))
            .cloned()
            .unwrap_or_default()
    }
}

/// A rectangular block of values, row-major.
pub type RangeValues = Vec<Vec<CellValue>>;

/// Result of evaluating an expression that may be a range.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(CellValue),
    Range(RangeValues),
}

impl From<CellValue> for Operand {
    fn from(value: CellValue) -> Self {
        Self::Value(value)
    }
}

/// Per-evaluation state threaded through the tree walk.
pub struct EvalContext<'a> {
    /// Sheet the formula lives on; unqualified references resolve here.
    pub sheet: &'a str,
    pub resolver: &'a dyn ValueResolver,
    /// Set when a precedent's value comes from a real cycle, so
    /// error-catching functions let circular references through.
    pub in_cycle: bool,
    /// References discovered while evaluating (e.g. through INDIRECT).
    pub dynamic_references: Vec<CellKey>,
}

impl<'a> EvalContext<'a> {
    pub fn new(sheet: &'a str, resolver: &'a dyn ValueResolver) -> Self {
        Self {
            sheet,
            resolver,
            in_cycle: false,
            dynamic_references: Vec::new(),
        }
    }
}

/// Outcome of evaluating a formula for a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: CellValue,
    pub dynamic_references: Vec<CellKey>,
}

/// Formula parsing cache and evaluator
pub struct FormulaEngine {
    /// Parsed trees keyed by formula text
    cache: HashMap<String, Arc<FormulaExpr>>,
    cache_limit: usize,
    max_range_cells: u64,
    functions: FunctionRegistry,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::with_cache_limit(4096)
    }

    pub fn with_cache_limit(cache_limit: usize) -> Self {
        Self {
            cache: HashMap::new(),
            cache_limit,
            max_range_cells: DEFAULT_MAX_RANGE_CELLS,
            functions: FunctionRegistry::default(),
        }
    }

    pub fn with_max_range_cells(mut self, max_range_cells: u64) -> Self {
        self.max_range_cells = max_range_cells;
        self
    }

    /// Access registered functions
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Parse formula text, reusing the tree of an identical earlier formula.
    pub fn parse(&mut self, formula: &str) -> Result<Arc<FormulaExpr>, FormulaError> {
        if let Some(expr) = self.cache.get(formula) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parser::parse_formula(formula)?);
        if self.cache.len() >= self.cache_limit {
            tracing::debug!(entries = self.cache.len(), "clearing formula parse cache");
            self.cache.clear();
        }
        self.cache.insert(formula.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn cached_formulas(&self) -> usize {
        self.cache.len()
    }

    /// Cells a formula reads through its literal references, ranges expanded.
    pub fn references(&self, expr: &FormulaExpr, sheet: &str) -> Vec<CellKey> {
        let mut keys = Vec::new();
        self.collect_references(expr, sheet, &mut keys);
        keys
    }

    fn collect_references(&self, expr: &FormulaExpr, sheet: &str, keys: &mut Vec<CellKey>) {
        match expr {
            FormulaExpr::Literal(_) | FormulaExpr::ErrorLiteral(_) => {}
            FormulaExpr::CellRef { .. } | FormulaExpr::RangeRef { .. } => {
                self.reference_keys(expr, sheet, keys);
            }
            FormulaExpr::FunctionCall { args, .. } => {
                for arg in args {
                    self.collect_references(arg, sheet, keys);
                }
            }
            FormulaExpr::BinaryOp { left, right, .. } => {
                self.collect_references(left, sheet, keys);
                self.collect_references(right, sheet, keys);
            }
            FormulaExpr::UnaryOp { expr, .. } => self.collect_references(expr, sheet, keys),
        }
    }

    /// Keys for a single reference node; out-of-range references add nothing.
    fn reference_keys(&self, expr: &FormulaExpr, sheet: &str, keys: &mut Vec<CellKey>) {
        match expr {
            FormulaExpr::CellRef {
                sheet: target,
                reference,
            } => {
                if reference.in_bounds() {
                    let target = target.as_deref().unwrap_or(sheet);
                    keys.push(CellKey::new(target, reference.location));
                }
            }
            FormulaExpr::RangeRef {
                sheet: target,
                start,
                end,
            } => {
                if let Some(bounds) = self.range_bounds(start, end) {
                    let target = target.as_deref().unwrap_or(sheet).to_lowercase();
                    for row in bounds.top..=bounds.bottom {
                        for col in bounds.left..=bounds.right {
                            keys.push(CellKey {
                                sheet: target.clone(),
                                location: CellLocation::new(col, row),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn range_bounds(&self, start: &CellReference, end: &CellReference) -> Option<RangeBounds> {
        if !start.in_bounds() || !end.in_bounds() {
            return None;
        }
        let bounds = RangeBounds::new(start.location, end.location);
        (bounds.cell_count() <= self.max_range_cells).then_some(bounds)
    }

    /// Evaluate a parsed formula for a cell on `sheet`.
    ///
    /// Errors never escape: they come back as `CellValue::Error`. An empty
    /// result is reported as zero.
    pub fn evaluate(
        &self,
        expr: &FormulaExpr,
        sheet: &str,
        resolver: &dyn ValueResolver,
        in_cycle: bool,
    ) -> Evaluation {
        let mut ctx = EvalContext::new(sheet, resolver);
        ctx.in_cycle = in_cycle;
        let value = match self.eval_value(expr, &mut ctx) {
            CellValue::Empty => CellValue::Number(Decimal::ZERO),
            value => value,
        };
        Evaluation {
            value,
            dynamic_references: ctx.dynamic_references,
        }
    }

    /// Evaluate in a scalar context; a bare range is a type error.
    pub fn eval_value(&self, expr: &FormulaExpr, ctx: &mut EvalContext<'_>) -> CellValue {
        match self.eval_operand(expr, ctx) {
            Operand::Value(value) => value,
            Operand::Range(_) => CellValue::Error(CellError::with_detail(
                ErrorKind::TypeError,
                "A range cannot be used where a single value is expected.",
            )),
        }
    }

    /// Evaluate in a context that accepts ranges.
    pub fn eval_operand(&self, expr: &FormulaExpr, ctx: &mut EvalContext<'_>) -> Operand {
        match expr {
            FormulaExpr::Literal(value) => Operand::Value(value.clone()),
            FormulaExpr::ErrorLiteral(kind) => Operand::Value(CellValue::error(*kind)),
            FormulaExpr::CellRef { sheet, reference } => {
                let sheet = sheet.as_deref().unwrap_or(ctx.sheet);
                if !reference.in_bounds() || !ctx.resolver.sheet_exists(sheet) {
                    return Operand::Value(CellValue::error(ErrorKind::BadReference));
                }
                Operand::Value(ctx.resolver.cell_value(sheet, reference.location))
            }
            FormulaExpr::RangeRef { sheet, start, end } => {
                let sheet = sheet.as_deref().unwrap_or(ctx.sheet);
                let Some(bounds) = self.range_bounds(start, end) else {
                    return Operand::Value(CellValue::error(ErrorKind::BadReference));
                };
                if !ctx.resolver.sheet_exists(sheet) {
                    return Operand::Value(CellValue::error(ErrorKind::BadReference));
                }
                let rows = (bounds.top..=bounds.bottom)
                    .map(|row| {
                        (bounds.left..=bounds.right)
                            .map(|col| ctx.resolver.cell_value(sheet, CellLocation::new(col, row)))
                            .collect()
                    })
                    .collect();
                Operand::Range(rows)
            }
            FormulaExpr::UnaryOp { op, expr } => {
                let value = self.eval_value(expr, ctx);
                Operand::Value(into_value(eval_unary(*op, &value)))
            }
            FormulaExpr::BinaryOp { op, left, right } => {
                let left = self.eval_value(left, ctx);
                let right = self.eval_value(right, ctx);
                if let Some(err) = CellError::prevailing([&left, &right]) {
                    return Operand::Value(CellValue::Error(err));
                }
                Operand::Value(into_value(eval_binary(*op, &left, &right)))
            }
            FormulaExpr::FunctionCall { name, args } => {
                let Some(def) = self.functions.get(name) else {
                    return Operand::Value(CellValue::Error(CellError::with_detail(
                        ErrorKind::BadName,
                        format!("Unknown function: {}", name),
                    )));
                };
                if let Err(expected) = def.validate_arg_count(args.len()) {
                    return Operand::Value(CellValue::Error(CellError::with_detail(
                        ErrorKind::TypeError,
                        format!(
                            "Invalid argument count for {}: expected {}, got {}",
                            name.to_uppercase(),
                            expected,
                            args.len()
                        ),
                    )));
                }
                match (def.eval)(self, args, ctx) {
                    Ok(operand) => operand,
                    Err(err) => Operand::Value(CellValue::Error(err)),
                }
            }
        }
    }

    /// Resolve a reference built at evaluation time and record the cells it
    /// touches as dynamic references.
    pub(crate) fn eval_dynamic_reference(
        &self,
        expr: &FormulaExpr,
        ctx: &mut EvalContext<'_>,
    ) -> Operand {
        let mut keys = Vec::new();
        self.reference_keys(expr, ctx.sheet, &mut keys);
        ctx.dynamic_references.extend(keys);
        self.eval_operand(expr, ctx)
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct RangeBounds {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl RangeBounds {
    fn new(a: CellLocation, b: CellLocation) -> Self {
        Self {
            left: a.col.min(b.col),
            top: a.row.min(b.row),
            right: a.col.max(b.col),
            bottom: a.row.max(b.row),
        }
    }

    fn cell_count(&self) -> u64 {
        u64::from(self.right - self.left + 1) * u64::from(self.bottom - self.top + 1)
    }
}

fn into_value(result: Result<CellValue, CellError>) -> CellValue {
    result.unwrap_or_else(CellValue::Error)
}

fn eval_unary(op: UnaryOperator, value: &CellValue) -> Result<CellValue, CellError> {
    let number = value.to_number()?;
    Ok(match op {
        UnaryOperator::Plus => CellValue::number(number),
        UnaryOperator::Negate => CellValue::number(-number),
    })
}

fn eval_binary(
    op: BinaryOperator,
    left: &CellValue,
    right: &CellValue,
) -> Result<CellValue, CellError> {
    use std::cmp::Ordering;

    let ordering = || left.compare(right);
    Ok(match op {
        BinaryOperator::Add => numeric_op(left, right, Decimal::checked_add)?,
        BinaryOperator::Subtract => numeric_op(left, right, Decimal::checked_sub)?,
        BinaryOperator::Multiply => numeric_op(left, right, Decimal::checked_mul)?,
        BinaryOperator::Divide => {
            let dividend = left.to_number()?;
            let divisor = right.to_number()?;
            if divisor.is_zero() {
                return Err(CellError::new(ErrorKind::DivideByZero));
            }
            CellValue::number(dividend.checked_div(divisor).ok_or_else(overflow)?)
        }
        BinaryOperator::Concat => CellValue::Text(left.to_text()? + &right.to_text()?),
        BinaryOperator::Equal => CellValue::Boolean(ordering() == Ordering::Equal),
        BinaryOperator::NotEqual => CellValue::Boolean(ordering() != Ordering::Equal),
        BinaryOperator::Less => CellValue::Boolean(ordering() == Ordering::Less),
        BinaryOperator::LessEqual => CellValue::Boolean(ordering() != Ordering::Greater),
        BinaryOperator::Greater => CellValue::Boolean(ordering() == Ordering::Greater),
        BinaryOperator::GreaterEqual => CellValue::Boolean(ordering() != Ordering::Less),
    })
}

fn numeric_op(
    left: &CellValue,
    right: &CellValue,
    op: fn(Decimal, Decimal) -> Option<Decimal>,
) -> Result<CellValue, CellError> {
    let l = left.to_number()?;
    let r = right.to_number()?;
    op(l, r).map(CellValue::number).ok_or_else(overflow)
}

fn overflow() -> CellError {
    CellError::with_detail(ErrorKind::TypeError, "Numeric overflow.")
}

/// Registry of available functions
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDefinition>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_standard_functions();
        registry
    }
}

impl FunctionRegistry {
    fn register_standard_functions(&mut self) {
        // Logical functions
        let logical: [(&str, FunctionImpl); 3] = [
            ("AND", functions::and_fn),
            ("OR", functions::or_fn),
            ("XOR", functions::xor_fn),
        ];
        for (name, eval) in logical {
            self.register(
                name,
                FunctionDefinition::variadic(1, ParamType::Logical, ReturnType::Logical, eval),
            );
        }
        self.register(
            "NOT",
            FunctionDefinition::fixed(
                vec![ParamType::Logical],
                ReturnType::Logical,
                functions::not_fn,
            ),
        );
        self.register(
            "IF",
            FunctionDefinition::range(
                2,
                3,
                vec![ParamType::Logical, ParamType::Any, ParamType::Any],
                ReturnType::Any,
                functions::if_fn,
            ),
        );
        self.register(
            "IFERROR",
            FunctionDefinition::range(
                1,
                2,
                vec![ParamType::Any, ParamType::Any],
                ReturnType::Any,
                functions::iferror,
            ),
        );
        self.register(
            "CHOOSE",
            FunctionDefinition::variadic(2, ParamType::Any, ReturnType::Any, functions::choose),
        );

        // Text functions
        self.register(
            "EXACT",
            FunctionDefinition::fixed(
                vec![ParamType::Text, ParamType::Text],
                ReturnType::Logical,
                functions::exact,
            ),
        );

        // Information functions
        self.register(
            "ISBLANK",
            FunctionDefinition::fixed(
                vec![ParamType::Any],
                ReturnType::Logical,
                functions::isblank,
            ),
        );
        self.register(
            "ISERROR",
            FunctionDefinition::fixed(
                vec![ParamType::Any],
                ReturnType::Logical,
                functions::iserror,
            ),
        );
        self.register(
            "VERSION",
            FunctionDefinition::fixed(vec![], ReturnType::Text, functions::version),
        );

        // Reference functions
        self.register(
            "INDIRECT",
            FunctionDefinition::fixed(
                vec![ParamType::Text],
                ReturnType::Range,
                functions::indirect,
            ),
        );

        // Aggregates
        let aggregates: [(&str, FunctionImpl); 4] = [
            ("SUM", functions::sum),
            ("MIN", functions::min),
            ("MAX", functions::max),
            ("AVERAGE", functions::average),
        ];
        for (name, eval) in aggregates {
            self.register(
                name,
                FunctionDefinition::variadic(1, ParamType::Range, ReturnType::Number, eval),
            );
        }

        // Lookup functions
        self.register(
            "VLOOKUP",
            FunctionDefinition::fixed(
                vec![ParamType::Any, ParamType::Range, ParamType::Number],
                ReturnType::Any,
                functions::vlookup,
            ),
        );
        self.register(
            "HLOOKUP",
            FunctionDefinition::fixed(
                vec![ParamType::Any, ParamType::Range, ParamType::Number],
                ReturnType::Any,
                functions::hlookup,
            ),
        );
    }

    fn register(&mut self, name: &str, def: FunctionDefinition) {
        self.functions.insert(name.to_lowercase(), def);
    }

    /// Check if a function exists
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    /// Get a function definition by name
    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(&name.to_lowercase())
    }

    /// Registered names, lower-cased and sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Built-in function signature. Arguments arrive unevaluated so functions
/// such as IF only visit the branch they select.
pub type FunctionImpl =
    fn(&FormulaEngine, &[FormulaExpr], &mut EvalContext<'_>) -> Result<Operand, CellError>;

/// Function definition
pub struct FunctionDefinition {
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub metadata: FunctionMetadata,
    pub eval: FunctionImpl,
}

impl FunctionDefinition {
    /// Fixed number of arguments
    pub fn fixed(params: Vec<ParamType>, return_type: ReturnType, eval: FunctionImpl) -> Self {
        let args = params.len();
        Self {
            min_args: args,
            max_args: Some(args),
            metadata: FunctionMetadata {
                params,
                variadic: None,
                return_type,
            },
            eval,
        }
    }

    /// Variable number of arguments
    pub fn variadic(
        min: usize,
        variadic: ParamType,
        return_type: ReturnType,
        eval: FunctionImpl,
    ) -> Self {
        Self {
            min_args: min,
            max_args: None,
            metadata: FunctionMetadata {
                params: Vec::new(),
                variadic: Some(variadic),
                return_type,
            },
            eval,
        }
    }

    /// Range of arguments
    pub fn range(
        min: usize,
        max: usize,
        params: Vec<ParamType>,
        return_type: ReturnType,
        eval: FunctionImpl,
    ) -> Self {
        Self {
            min_args: min,
            max_args: Some(max),
            metadata: FunctionMetadata {
                params,
                variadic: None,
                return_type,
            },
            eval,
        }
    }

    fn validate_arg_count(&self, provided: usize) -> Result<(), String> {
        if provided < self.min_args {
            return Err(self.expected_args_label());
        }
        if let Some(max) = self.max_args {
            if provided > max {
                return Err(self.expected_args_label());
            }
        }
        Ok(())
    }

    fn expected_args_label(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", self.min_args),
            Some(max) => format!("{}..{}", self.min_args, max),
            None => format!("{}+", self.min_args),
        }
    }
}

/// Formula errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<FormulaError> for CellError {
    fn from(err: FormulaError) -> Self {
        CellError::with_detail(ErrorKind::ParseError, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    Number,
    Logical,
    Text,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Any,
    Number,
    Logical,
    Text,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub params: Vec<ParamType>,
    pub variadic: Option<ParamType>,
    pub return_type: ReturnType,
}
