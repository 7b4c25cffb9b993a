use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheetcalc_formulas::{parse_formula, FormulaEngine, MapResolver};
use sheetcalc_primitives::{CellLocation, CellValue};
use sheetcalc_sheet::Workbook;

fn chain_workbook(size: u32) -> Workbook {
    let mut book = Workbook::new();
    book.new_sheet(None).unwrap();
    book.set_cell_contents("Sheet1", "A1", Some("1")).unwrap();
    for row in 2..=size {
        book.set_cell_contents("Sheet1", &format!("A{row}"), Some(&format!("=A{}+1", row - 1)))
            .unwrap();
    }
    book
}

fn fan_out_workbook(size: u32) -> Workbook {
    let mut book = Workbook::new();
    book.new_sheet(None).unwrap();
    book.set_cell_contents("Sheet1", "A1", Some("1")).unwrap();
    for row in 1..=size {
        book.set_cell_contents("Sheet1", &format!("B{row}"), Some("=A1*2"))
            .unwrap();
    }
    book
}

fn bench_parse_formulas(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("simple", |b| b.iter(|| parse_formula(black_box("=1+2"))));

    group.bench_function("cell_ref", |b| {
        b.iter(|| parse_formula(black_box("=A1+Sheet2!B2")))
    });

    group.bench_function("nested", |b| {
        b.iter(|| parse_formula(black_box("=IF(A1>10,SUM(B1:B10),AVERAGE(C1:C10))")))
    });

    group.bench_function("cached", |b| {
        let mut engine = FormulaEngine::new();
        b.iter(|| engine.parse(black_box("=IF(A1>10,SUM(B1:B10),AVERAGE(C1:C10))")))
    });

    group.finish();
}

fn bench_evaluate_ranges(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let mut engine = FormulaEngine::new();

    for size in [10_u32, 100, 1000, 10000] {
        let mut resolver = MapResolver::new().with_sheet("Sheet1");
        for row in 1..=size {
            resolver.set(
                "Sheet1",
                CellLocation::new(1, row),
                CellValue::from(i64::from(row)),
            );
        }
        let expr = engine.parse(&format!("=SUM(A1:A{size})")).unwrap();

        group.bench_with_input(BenchmarkId::new("sum", size), &size, |b, _| {
            b.iter(|| engine.evaluate(black_box(&expr), "Sheet1", &resolver, false))
        });
    }

    group.finish();
}

fn bench_recalculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("recalc");
    group.sample_size(20);

    for size in [100_u32, 1000, 5000] {
        let mut book = chain_workbook(size);
        let mut toggle = false;
        group.bench_with_input(BenchmarkId::new("chain", size), &size, |b, _| {
            b.iter(|| {
                toggle = !toggle;
                let value = if toggle { "2" } else { "1" };
                book.set_cell_contents("Sheet1", "A1", Some(value)).unwrap();
            })
        });
    }

    for size in [100_u32, 1000, 5000] {
        let mut book = fan_out_workbook(size);
        let mut toggle = false;
        group.bench_with_input(BenchmarkId::new("fan_out", size), &size, |b, _| {
            b.iter(|| {
                toggle = !toggle;
                let value = if toggle { "2" } else { "1" };
                book.set_cell_contents("Sheet1", "A1", Some(value)).unwrap();
            })
        });
    }

    for size in [100_u32, 1000] {
        let mut book = chain_workbook(size);
        let mut closed = false;
        group.bench_with_input(BenchmarkId::new("cycle_toggle", size), &size, |b, _| {
            b.iter(|| {
                closed = !closed;
                let contents = if closed {
                    format!("=A{size}")
                } else {
                    "1".to_string()
                };
                book.set_cell_contents("Sheet1", "A1", Some(&contents)).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_formulas,
    bench_evaluate_ranges,
    bench_recalculation
);
criterion_main!(benches);
