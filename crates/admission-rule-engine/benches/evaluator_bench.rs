//! 字段匹配评估性能基准测试
//!
//! 针对 ConditionEvaluator::match_values 的各种操作进行细粒度的性能测试。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::{ConditionEvaluator, MatchOp};
use serde_json::{Value, json};
use std::hint::black_box;

/// 数值比较操作基准
fn bench_numeric_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_operations");

    let field = json!(1000);
    let expected = json!(500);

    for (name, op) in [
        ("eq", MatchOp::Eq),
        ("neq", MatchOp::Neq),
        ("gt", MatchOp::Gt),
        ("gte", MatchOp::Gte),
        ("lt", MatchOp::Lt),
        ("lte", MatchOp::Lte),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                ConditionEvaluator::match_values(
                    black_box(op),
                    black_box(Some(&field)),
                    black_box(&expected),
                )
            })
        });
    }

    group.finish();
}

/// 字符串操作基准
fn bench_string_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_operations");

    let field = json!("hello world");
    let substr = json!("world");

    group.bench_function("contains", |b| {
        b.iter(|| {
            ConditionEvaluator::match_values(
                black_box(MatchOp::Contains),
                black_box(Some(&field)),
                black_box(&substr),
            )
        })
    });

    let email = json!("user@example.com");
    let pattern = json!(r"^[\w.-]+@[\w.-]+\.\w+$");
    group.bench_function("regex", |b| {
        b.iter(|| {
            ConditionEvaluator::match_values(
                black_box(MatchOp::Regex),
                black_box(Some(&email)),
                black_box(&pattern),
            )
        })
    });

    group.finish();
}

/// In 操作符不同列表大小的性能
fn bench_in_operator_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_operator_scaling");

    let field = json!("target");

    for size in [5, 10, 50, 100, 500].iter() {
        let list: Vec<Value> = (0..*size)
            .map(|i| {
                if i == size - 1 {
                    json!("target")
                } else {
                    json!(format!("item_{}", i))
                }
            })
            .collect();
        let list_value = Value::Array(list);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                ConditionEvaluator::match_values(
                    black_box(MatchOp::In),
                    black_box(Some(&field)),
                    black_box(&list_value),
                )
            })
        });
    }

    group.finish();
}

/// 缺失字段处理基准
fn bench_missing_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("missing_field");

    let expected = json!("test");

    group.bench_function("eq_missing", |b| {
        b.iter(|| {
            ConditionEvaluator::match_values(
                black_box(MatchOp::Eq),
                black_box(None),
                black_box(&expected),
            )
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_numeric_operations,
    bench_string_operations,
    bench_in_operator_scaling,
    bench_missing_field,
);

criterion_main!(benches);
