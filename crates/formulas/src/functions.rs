//! Built-in spreadsheet functions.
//!
//! Every function receives its argument expressions unevaluated together
//! with the engine, and evaluates only what it needs.

use crate::{parser, EvalContext, FormulaEngine, FormulaExpr, Operand, RangeValues};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sheetcalc_primitives::{CellError, CellValue, ErrorKind};

type FnResult = Result<Operand, CellError>;

fn type_error(detail: &str) -> CellError {
    CellError::with_detail(ErrorKind::TypeError, detail)
}

/// Evaluate every argument as a scalar and fail with the prevailing error.
fn eval_all(
    engine: &FormulaEngine,
    args: &[FormulaExpr],
    ctx: &mut EvalContext<'_>,
) -> Result<Vec<CellValue>, CellError> {
    let values: Vec<CellValue> = args.iter().map(|arg| engine.eval_value(arg, ctx)).collect();
    match CellError::prevailing(&values) {
        Some(err) => Err(err),
        None => Ok(values),
    }
}

fn eval_single(
    engine: &FormulaEngine,
    arg: &FormulaExpr,
    ctx: &mut EvalContext<'_>,
) -> Result<CellValue, CellError> {
    match engine.eval_value(arg, ctx) {
        CellValue::Error(err) => Err(err),
        value => Ok(value),
    }
}

fn eval_bools(
    engine: &FormulaEngine,
    args: &[FormulaExpr],
    ctx: &mut EvalContext<'_>,
) -> Result<Vec<bool>, CellError> {
    eval_all(engine, args, ctx)?
        .iter()
        .map(CellValue::to_bool)
        .collect()
}

pub fn and_fn(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let values = eval_bools(engine, args, ctx)?;
    Ok(CellValue::Boolean(values.into_iter().all(|b| b)).into())
}

pub fn or_fn(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let values = eval_bools(engine, args, ctx)?;
    Ok(CellValue::Boolean(values.into_iter().any(|b| b)).into())
}

pub fn xor_fn(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let values = eval_bools(engine, args, ctx)?;
    let trues = values.into_iter().filter(|b| *b).count();
    Ok(CellValue::Boolean(trues % 2 == 1).into())
}

pub fn not_fn(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let value = eval_single(engine, &args[0], ctx)?;
    Ok(CellValue::Boolean(!value.to_bool()?).into())
}

/// Case-sensitive comparison of the text forms.
pub fn exact(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let values = eval_all(engine, args, ctx)?;
    let left = values[0].to_text()?;
    let right = values[1].to_text()?;
    Ok(CellValue::Boolean(left == right).into())
}

/// Only the selected branch is evaluated.
pub fn if_fn(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let condition = eval_single(engine, &args[0], ctx)?.to_bool()?;
    let branch = if condition { args.get(1) } else { args.get(2) };
    let Some(branch) = branch else {
        return Ok(CellValue::Boolean(false).into());
    };
    Ok(match engine.eval_value(branch, ctx) {
        CellValue::Empty => CellValue::Number(Decimal::ZERO),
        value => value,
    }
    .into())
}

pub fn iferror(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let value = engine.eval_value(&args[0], ctx);
    match value {
        CellValue::Error(err) if err.kind == ErrorKind::CircularReference && ctx.in_cycle => {
            Err(err)
        }
        CellValue::Error(_) => match args.get(1) {
            Some(fallback) => Ok(engine.eval_value(fallback, ctx).into()),
            None => Ok(CellValue::Text(String::new()).into()),
        },
        value => Ok(value.into()),
    }
}

/// `CHOOSE(index, v1, v2, ...)`, 1-based; only the chosen value is evaluated.
pub fn choose(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let index = eval_single(engine, &args[0], ctx)?.to_number()?;
    let options = &args[1..];
    let chosen = to_index(index)
        .filter(|i| *i <= options.len())
        .ok_or_else(|| type_error("Index out of range."))?;
    Ok(engine.eval_value(&options[chosen - 1], ctx).into())
}

pub fn isblank(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let value = eval_single(engine, &args[0], ctx)?;
    Ok(CellValue::Boolean(value.is_empty()).into())
}

pub fn iserror(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    match engine.eval_value(&args[0], ctx) {
        CellValue::Error(err) if err.kind == ErrorKind::CircularReference && ctx.in_cycle => {
            Err(err)
        }
        value => Ok(CellValue::Boolean(value.as_error().is_some()).into()),
    }
}

pub fn version(_: &FormulaEngine, _: &[FormulaExpr], _: &mut EvalContext<'_>) -> FnResult {
    Ok(CellValue::Text(env!("CARGO_PKG_VERSION").to_string()).into())
}

/// Resolve a reference written as text, e.g. `INDIRECT("Sheet2!B" & A1)`.
pub fn indirect(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let text = eval_single(engine, &args[0], ctx)?.to_text()?;
    let reference = parser::parse_reference(&text).map_err(|_| {
        CellError::with_detail(
            ErrorKind::BadReference,
            format!("\"{}\" is not a valid reference.", text),
        )
    })?;
    match engine.eval_dynamic_reference(&reference, ctx) {
        Operand::Value(CellValue::Error(err)) => Err(err),
        operand => Ok(operand),
    }
}

/// Numbers from scalars and ranges. Range entries that are not numbers are
/// skipped; empty scalars are skipped too.
fn collect_numbers(
    engine: &FormulaEngine,
    args: &[FormulaExpr],
    ctx: &mut EvalContext<'_>,
) -> Result<Vec<Decimal>, CellError> {
    let mut numbers = Vec::new();
    // Failures in argument order, coercion failures included
    let mut failures = Vec::new();

    for arg in args {
        match engine.eval_operand(arg, ctx) {
            Operand::Range(rows) => {
                for value in rows.into_iter().flatten() {
                    match value {
                        CellValue::Number(n) => numbers.push(n),
                        CellValue::Error(_) => failures.push(value),
                        _ => {}
                    }
                }
            }
            Operand::Value(CellValue::Empty) => {}
            Operand::Value(value @ CellValue::Error(_)) => failures.push(value),
            Operand::Value(value) => match value.to_number() {
                Ok(n) => numbers.push(n),
                Err(err) => failures.push(CellValue::Error(err)),
            },
        }
    }

    match CellError::prevailing(&failures) {
        Some(err) => Err(err),
        None => Ok(numbers),
    }
}

fn checked_sum(numbers: &[Decimal]) -> Result<Decimal, CellError> {
    numbers
        .iter()
        .try_fold(Decimal::ZERO, |acc, n| acc.checked_add(*n))
        .ok_or_else(|| type_error("Numeric overflow."))
}

pub fn sum(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let numbers = collect_numbers(engine, args, ctx)?;
    Ok(CellValue::number(checked_sum(&numbers)?).into())
}

pub fn min(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let numbers = collect_numbers(engine, args, ctx)?;
    let min = numbers.into_iter().min().unwrap_or(Decimal::ZERO);
    Ok(CellValue::number(min).into())
}

pub fn max(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let numbers = collect_numbers(engine, args, ctx)?;
    let max = numbers.into_iter().max().unwrap_or(Decimal::ZERO);
    Ok(CellValue::number(max).into())
}

pub fn average(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    let numbers = collect_numbers(engine, args, ctx)?;
    if numbers.is_empty() {
        return Err(CellError::with_detail(
            ErrorKind::DivideByZero,
            "AVERAGE has no numeric values.",
        ));
    }
    let total = checked_sum(&numbers)?;
    let count = Decimal::from(numbers.len());
    let mean = total
        .checked_div(count)
        .ok_or_else(|| type_error("Numeric overflow."))?;
    Ok(CellValue::number(mean).into())
}

#[derive(Clone, Copy)]
enum LookupAxis {
    Rows,
    Columns,
}

pub fn vlookup(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    lookup(engine, args, ctx, LookupAxis::Rows)
}

pub fn hlookup(engine: &FormulaEngine, args: &[FormulaExpr], ctx: &mut EvalContext<'_>) -> FnResult {
    lookup(engine, args, ctx, LookupAxis::Columns)
}

/// Exact, case-sensitive match of the key's text against the first column
/// (VLOOKUP) or first row (HLOOKUP).
fn lookup(
    engine: &FormulaEngine,
    args: &[FormulaExpr],
    ctx: &mut EvalContext<'_>,
    axis: LookupAxis,
) -> FnResult {
    let key = engine.eval_value(&args[0], ctx);
    let table = engine.eval_operand(&args[1], ctx);
    let index = engine.eval_value(&args[2], ctx);

    let rows = match table {
        Operand::Range(rows) => rows,
        Operand::Value(value) => {
            return Err(CellError::prevailing([&key, &value, &index])
                .unwrap_or_else(|| type_error("Lookup requires a range.")));
        }
    };
    if let Some(err) = CellError::prevailing([&key, &index]) {
        return Err(err);
    }

    let key = key.to_text()?;
    let index = to_index(index.to_number()?).ok_or_else(|| type_error("Index out of range."))?;
    let lines = match axis {
        LookupAxis::Rows => rows,
        LookupAxis::Columns => transpose(rows),
    };

    let width = lines.first().map_or(0, Vec::len);
    if index > width {
        return Err(type_error("Index out of range."));
    }
    lines
        .into_iter()
        .find(|line| {
            line.first()
                .and_then(|head| head.to_text().ok())
                .is_some_and(|head| head == key)
        })
        .map(|mut line| Operand::Value(line.swap_remove(index - 1)))
        .ok_or_else(|| type_error("Lookup key not found."))
}

fn transpose(rows: RangeValues) -> RangeValues {
    let width = rows.first().map_or(0, Vec::len);
    let mut columns: RangeValues = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
    for row in rows {
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
    columns
}

/// A positive whole number usable as a 1-based index.
fn to_index(value: Decimal) -> Option<usize> {
    if !value.fract().is_zero() || value < Decimal::ONE {
        return None;
    }
    value.to_usize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapResolver;
    use sheetcalc_primitives::CellLocation;
    use std::str::FromStr;

    fn resolver() -> MapResolver {
        let mut resolver = MapResolver::new();
        let cells = [
            ((1, 1), CellValue::Text("apple".into())),
            ((2, 1), CellValue::from(3_i64)),
            ((1, 2), CellValue::Text("Pear".into())),
            ((2, 2), CellValue::from(7_i64)),
            ((1, 3), CellValue::Boolean(true)),
            ((2, 3), CellValue::Text("x".into())),
            ((3, 1), CellValue::error(ErrorKind::DivideByZero)),
        ];
        for ((col, row), value) in cells {
            resolver.set("Sheet1", CellLocation::new(col, row), value);
        }
        resolver.set("Other", CellLocation::new(1, 1), CellValue::from(40_i64));
        resolver
    }

    fn eval(formula: &str) -> CellValue {
        eval_with(formula, false)
    }

    fn eval_with(formula: &str, in_cycle: bool) -> CellValue {
        let mut engine = FormulaEngine::new();
        let expr = engine.parse(formula).unwrap();
        engine
            .evaluate(&expr, "Sheet1", &resolver(), in_cycle)
            .value
    }

    fn num(text: &str) -> CellValue {
        CellValue::number(Decimal::from_str(text).unwrap())
    }

    #[test]
    fn test_logical_functions() {
        assert_eq!(eval("=AND(1, TRUE, \"true\")"), CellValue::Boolean(true));
        assert_eq!(eval("=AND(1, 0)"), CellValue::Boolean(false));
        assert_eq!(eval("=OR(FALSE, 0, 2)"), CellValue::Boolean(true));
        assert_eq!(eval("=XOR(TRUE, TRUE, TRUE)"), CellValue::Boolean(true));
        assert_eq!(eval("=NOT(Z99)"), CellValue::Boolean(true));
        assert_eq!(eval("=AND(\"yes\")").error_kind(), Some(ErrorKind::TypeError));
        assert_eq!(eval("=AND()").error_kind(), Some(ErrorKind::TypeError));
        assert_eq!(
            eval("=OR(#REF!, #ERROR!)").error_kind(),
            Some(ErrorKind::ParseError)
        );
    }

    #[test]
    fn test_exact_is_case_sensitive() {
        assert_eq!(eval("=EXACT(A1, \"apple\")"), CellValue::Boolean(true));
        assert_eq!(eval("=EXACT(A2, \"pear\")"), CellValue::Boolean(false));
        assert_eq!(eval("=EXACT(Z1, \"\")"), CellValue::Boolean(true));
        assert_eq!(eval("=EXACT(1.50, \"1.5\")"), CellValue::Boolean(true));
    }

    #[test]
    fn test_if_is_lazy() {
        assert_eq!(eval("=IF(FALSE, 1/0, 99)"), num("99"));
        assert_eq!(eval("=IF(TRUE, 5, NOPE())"), num("5"));
        assert_eq!(eval("=IF(0, 1)"), CellValue::Boolean(false));
        assert_eq!(eval("=IF(TRUE, Z5)&\"\""), CellValue::Text("0".into()));
        assert_eq!(eval("=IF(\"maybe\", 1, 2)").error_kind(), Some(ErrorKind::TypeError));
        assert_eq!(eval("=IF(#REF!, 1, 2)").error_kind(), Some(ErrorKind::BadReference));
    }

    #[test]
    fn test_iferror() {
        assert_eq!(eval("=IFERROR(1/0, \"none\")"), CellValue::Text("none".into()));
        assert_eq!(eval("=IFERROR(C1)"), CellValue::Text(String::new()));
        assert_eq!(eval("=IFERROR(B1, 1/0)"), num("3"));
        assert_eq!(eval("=IFERROR(#CIRCREF!, 1)"), num("1"));
        assert_eq!(
            eval_with("=IFERROR(#CIRCREF!, 1)", true).error_kind(),
            Some(ErrorKind::CircularReference)
        );
    }

    #[test]
    fn test_choose() {
        assert_eq!(eval("=CHOOSE(2, 1/0, \"b\", 3)"), CellValue::Text("b".into()));
        assert_eq!(eval("=CHOOSE(\"3\", 1, 2, 3)"), num("3"));
        assert_eq!(eval("=CHOOSE(4, 1, 2, 3)").error_kind(), Some(ErrorKind::TypeError));
        assert_eq!(eval("=CHOOSE(1.5, 1, 2)").error_kind(), Some(ErrorKind::TypeError));
        assert_eq!(eval("=CHOOSE(0, 1, 2)").error_kind(), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_information_functions() {
        assert_eq!(eval("=ISBLANK(Z1)"), CellValue::Boolean(true));
        assert_eq!(eval("=ISBLANK(\"\")"), CellValue::Boolean(false));
        assert_eq!(eval("=ISBLANK(A1)"), CellValue::Boolean(false));
        assert_eq!(eval("=ISERROR(C1)"), CellValue::Boolean(true));
        assert_eq!(eval("=ISERROR(A1)"), CellValue::Boolean(false));
        assert_eq!(
            eval_with("=ISERROR(#CIRCREF!)", true).error_kind(),
            Some(ErrorKind::CircularReference)
        );
        assert_eq!(
            eval("=VERSION()"),
            CellValue::Text(env!("CARGO_PKG_VERSION").into())
        );
    }

    #[test]
    fn test_indirect() {
        assert_eq!(eval("=INDIRECT(\"B\" & 2)"), num("7"));
        assert_eq!(eval("=INDIRECT(\"Other!A1\") + 2"), num("42"));
        assert_eq!(eval("=SUM(INDIRECT(\"B1:B2\"))"), num("10"));
        assert_eq!(
            eval("=INDIRECT(\"not a ref\")").error_kind(),
            Some(ErrorKind::BadReference)
        );
        assert_eq!(
            eval("=INDIRECT(\"Missing!A1\")").error_kind(),
            Some(ErrorKind::BadReference)
        );
    }

    #[test]
    fn test_indirect_records_dynamic_references() {
        let mut engine = FormulaEngine::new();
        let expr = engine.parse("=INDIRECT(\"Later!A1:A2\")").unwrap();
        let eval = engine.evaluate(&expr, "Sheet1", &resolver(), false);
        assert_eq!(eval.value.error_kind(), Some(ErrorKind::BadReference));
        assert_eq!(eval.dynamic_references.len(), 2);
        assert!(eval.dynamic_references.iter().all(|k| k.sheet == "later"));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(eval("=SUM(B1:B3, 10)"), num("20"));
        assert_eq!(eval("=MIN(A1:B3)"), num("3"));
        assert_eq!(eval("=MAX(A1:B3, \"12\")"), num("12"));
        assert_eq!(eval("=AVERAGE(B1:B2)"), num("5"));
        assert_eq!(eval("=MIN(Z1)"), num("0"));
        assert_eq!(
            eval("=AVERAGE(A1:A3)").error_kind(),
            Some(ErrorKind::DivideByZero)
        );
        assert_eq!(eval("=SUM(A1:C1)").error_kind(), Some(ErrorKind::DivideByZero));
        assert_eq!(
            eval("=SUM(C1, #CIRCREF!)").error_kind(),
            Some(ErrorKind::CircularReference)
        );
        assert_eq!(eval("=SUM(\"abc\")").error_kind(), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_aggregate_errors_keep_argument_order() {
        assert_eq!(
            eval("=SUM(\"abc\", C1)").error_kind(),
            Some(ErrorKind::TypeError)
        );
        assert_eq!(
            eval("=SUM(C1, \"abc\")").error_kind(),
            Some(ErrorKind::DivideByZero)
        );
        assert_eq!(
            eval("=MAX(\"abc\", A1:C1)").error_kind(),
            Some(ErrorKind::TypeError)
        );
        assert_eq!(
            eval("=MIN(\"abc\", #CIRCREF!)").error_kind(),
            Some(ErrorKind::CircularReference)
        );
    }

    #[test]
    fn test_lookups() {
        assert_eq!(eval("=VLOOKUP(\"Pear\", A1:B3, 2)"), num("7"));
        assert_eq!(
            eval("=VLOOKUP(\"pear\", A1:B3, 2)").error_kind(),
            Some(ErrorKind::TypeError)
        );
        assert_eq!(eval("=VLOOKUP(TRUE, A1:B3, 2)"), CellValue::Text("x".into()));
        assert_eq!(
            eval("=VLOOKUP(\"apple\", A1:B3, 3)").error_kind(),
            Some(ErrorKind::TypeError)
        );
        assert_eq!(eval("=HLOOKUP(\"apple\", A1:B2, 2)"), CellValue::Text("Pear".into()));
        assert_eq!(eval("=HLOOKUP(3, B1:B2, 2)"), num("7"));
        assert_eq!(
            eval("=VLOOKUP(\"apple\", A1, 1)").error_kind(),
            Some(ErrorKind::TypeError)
        );
    }

    #[test]
    fn test_to_index() {
        assert_eq!(to_index(Decimal::from(3)), Some(3));
        assert_eq!(to_index(Decimal::from_str("2.0").unwrap()), Some(2));
        assert_eq!(to_index(Decimal::from_str("2.5").unwrap()), None);
        assert_eq!(to_index(Decimal::ZERO), None);
    }
}
