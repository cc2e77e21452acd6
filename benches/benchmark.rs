use criterion::{black_box, criterion_group, criterion_main, Criterion};

use limber::cache::{CachedResult, QueryCache, QueryKey, ResultShape};
use limber::dialect::DialectAdapter;
use limber::mssql::MsSqlDialect;
use limber::settings::ConversionOptions;
use limber::sqlite::SqliteDialect;
use limber::value::Value;

fn cache_churn(c: &mut Criterion) {
    c.bench_function("cache_put_get", |b| {
        let mut cache = QueryCache::new(100);
        let mut i = 0usize;
        b.iter(|| {
            // 150 distinct keys over 100 slots keeps eviction busy
            let key = QueryKey {
                shape: ResultShape::Scalar,
                sql: format!("select {}", i % 150),
                params: Vec::new(),
            };
            cache.put(key.clone(), CachedResult::Scalar(Value::Int(i as i64)));
            black_box(cache.get(&key));
            i += 1;
        })
    });
}

fn rank_classification(c: &mut Criterion) {
    let values = vec![
        Value::Int(5),
        Value::Int(70_000),
        Value::Int(i64::MAX),
        Value::Double(1.5),
        Value::Text("short".to_owned()),
        Value::Text("x".repeat(500)),
        Value::Bool(true),
    ];
    c.bench_function("rank_of_mssql", |b| {
        b.iter(|| {
            for value in &values {
                black_box(MsSqlDialect.rank_of(value));
            }
        })
    });
    c.bench_function("rank_of_sqlite", |b| {
        b.iter(|| {
            for value in &values {
                black_box(SqliteDialect.rank_of(value));
            }
        })
    });
}

fn numeric_recognition(c: &mut Criterion) {
    let options = ConversionOptions {
        recognize_integers: true,
        ..ConversionOptions::default()
    };
    c.bench_function("recognize_integers", |b| {
        b.iter(|| {
            black_box(options.apply(Value::Text("123456789".to_owned())));
            black_box(options.apply(Value::Text("123456789012345678901".to_owned())));
            black_box(options.apply(Value::Text("not a number".to_owned())));
        })
    });
}

criterion_group!(benches, cache_churn, rank_classification, numeric_recognition);
criterion_main!(benches);
