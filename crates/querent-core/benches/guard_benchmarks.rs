//! Benchmarks for SQL guard validation cost.
//!
//! Validation runs once per question, ahead of a database round trip, so
//! it should stay well under a millisecond even for long analytic queries.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use querent_core::config::GuardConfig;
use querent_core::safety::QueryGuard;

/// Build a realistic reporting query. Shape varies by index.
fn generate_query(index: usize) -> String {
    match index % 4 {
        0 => format!(
            "SELECT customer_name, SUM(revenue) AS revenue FROM sales \
             WHERE region_id = {} GROUP BY customer_name ORDER BY revenue DESC LIMIT 10",
            index
        ),
        1 => format!(
            "SELECT DATE_TRUNC('month', created_at) AS month, COUNT(*) AS orders, \
             ROUND(AVG(total), 2) AS avg_total FROM orders o \
             JOIN customers c ON c.id = o.customer_id \
             WHERE c.segment IN ('retail', 'wholesale') AND o.id > {} \
             GROUP BY 1 ORDER BY 1",
            index
        ),
        2 => format!(
            "SELECT p.name, COALESCE(MAX(s.qty), 0) FROM products p \
             LEFT JOIN (SELECT product_id, qty FROM stock WHERE warehouse = {} LIMIT 500) s \
             ON s.product_id = p.id GROUP BY p.name -- ranked by stock",
            index
        ),
        _ => format!(
            "SELECT name FROM archived_users WHERE id < {} \
             UNION SELECT name FROM users WHERE LOWER(email) LIKE '%@example.com';",
            index
        ),
    }
}

fn bench_guard_validate(c: &mut Criterion) {
    let guard = QueryGuard::new(&GuardConfig::default());
    let queries: Vec<String> = (0..1000).map(generate_query).collect();
    let rejected = "SELECT name FROM users; DROP TABLE users; -- cleanup".to_string();

    let mut group = c.benchmark_group("guard_validate");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("accepted_single_query", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let sql = &queries[idx % queries.len()];
            let outcome = guard.validate_sql(sql);
            idx += 1;
            outcome
        });
    });

    group.bench_function("rejected_stacked_query", |b| {
        b.iter(|| guard.validate_sql(&rejected));
    });

    group.bench_function("accepted_batch_100", |b| {
        b.iter(|| {
            queries[..100]
                .iter()
                .map(|sql| guard.validate_sql(sql))
                .collect::<Vec<_>>()
        });
    });

    group.finish();
}

/// Standalone p95 check over 1000 queries.
fn bench_guard_latency_assertion(c: &mut Criterion) {
    let guard = QueryGuard::new(&GuardConfig::default());
    let queries: Vec<String> = (0..1000).map(generate_query).collect();
    let target = Duration::from_micros(1000);

    let mut group = c.benchmark_group("guard_latency_assertion");
    group.sample_size(100);
    group.bench_function("validate_per_query", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let outcome = guard.validate_sql(&queries[idx % queries.len()]);
            idx += 1;
            outcome
        });
    });
    group.finish();

    let mut times = Vec::with_capacity(queries.len());
    for sql in &queries {
        let start = std::time::Instant::now();
        let _outcome = guard.validate_sql(sql);
        times.push(start.elapsed());
    }
    times.sort();
    let median = times[499];
    let p95 = times[949];
    let max = times[times.len() - 1];

    eprintln!("\n=== Guard validation latency (1000 queries) ===");
    eprintln!("Median:  {:?}", median);
    eprintln!("p95:     {:?} (target: {:?})", p95, target);
    eprintln!("Max:     {:?}", max);

    assert!(
        p95 < target,
        "Guard validation p95 {:?} exceeds target {:?}",
        p95,
        target
    );
}

criterion_group!(benches, bench_guard_validate, bench_guard_latency_assertion);
criterion_main!(benches);
