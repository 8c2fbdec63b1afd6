//! Benchmarks for relation path parsing, SQL rendering and row identities.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use eloquent_query::{
    Dialect, Filter, Record, RelationPath, SelectQuery, Value,
    testing::{MockEngine, client},
};

// ============================================================================
// Path Parsing Benchmarks
// ============================================================================

fn bench_path_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_parsing");

    group.bench_function("single_segment", |b| {
        b.iter(|| black_box(RelationPath::parse("posts")))
    });

    group.bench_function("nested_aliased", |b| {
        b.iter(|| black_box(RelationPath::parse("posts.comments.createdBy as p.c.author")))
    });

    group.bench_function("counted", |b| {
        b.iter(|| black_box(RelationPath::parse_counted("posts.comments as commentTotal")))
    });

    group.finish();
}

// ============================================================================
// SQL Rendering Benchmarks
// ============================================================================

fn bench_select_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_rendering");

    for size in [10usize, 100, 1000] {
        let ids: Vec<Value> = (0..size as i64).map(Into::into).collect();
        let query = SelectQuery::new("users").filter(Filter::and([
            Filter::in_values("users.id", ids),
            Filter::is_null("users.deletedAt"),
        ]));
        group.bench_with_input(BenchmarkId::new("in_list", size), &query, |b, query| {
            b.iter(|| black_box(query.build(Dialect::Sqlite)))
        });
    }

    group.finish();
}

fn bench_where_has(c: &mut Criterion) {
    let client = client(MockEngine::new());

    c.bench_function("where_has_nested", |b| {
        b.iter(|| {
            futures::executor::block_on(async {
                let mut query = client.query("User").unwrap();
                query.where_has("posts.comments").unwrap();
                black_box(query.to_sql().await)
            })
        })
    });
}

// ============================================================================
// Row Identity Benchmarks
// ============================================================================

fn bench_row_identity(c: &mut Criterion) {
    let client = client(MockEngine::new());
    let writer = client.bulk("Post").unwrap();
    let record = Record::from_pairs([
        ("title", Value::from("Hello")),
        ("createdById", Value::from(7)),
    ]);

    c.bench_function("row_identity_composite", |b| {
        b.iter(|| black_box(writer.row_identity(&record, &["title", "createdById"])))
    });
}

criterion_group!(
    benches,
    bench_path_parsing,
    bench_select_rendering,
    bench_where_has,
    bench_row_identity,
);
criterion_main!(benches);
