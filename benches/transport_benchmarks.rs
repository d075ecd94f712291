//! Transport Benchmarks
//!
//! Node selection, liveness bookkeeping and sniff response parsing.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sluice_transport::{
    Node, NodePool, NodePoolConfig, SelectionStrategy, SniffFilter, Url, parse_nodes_info,
};
use std::hint::black_box;

fn nodes(count: usize) -> Vec<Node> {
    (0..count)
        .filter_map(|i| Url::parse(&format!("http://10.0.0.{}:9200", i + 1)).ok())
        .map(Node::new)
        .collect()
}

fn pool(count: usize, strategy: SelectionStrategy) -> NodePool {
    let config = NodePoolConfig {
        strategy,
        ..Default::default()
    };
    NodePool::new(nodes(count), config)
}

// =============================================================================
// Selection
// =============================================================================

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_selection");

    for size in [1, 5, 25] {
        for (name, strategy) in [
            ("round_robin", SelectionStrategy::RoundRobin),
            ("sticky", SelectionStrategy::Sticky),
            ("random", SelectionStrategy::Random),
        ] {
            let pool = pool(size, strategy);
            group.bench_with_input(BenchmarkId::new(name, size), &pool, |b, pool| {
                b.iter(|| black_box(pool.next().into_lease()))
            });
        }
    }

    // half the pool dead
    let pool = pool(10, SelectionStrategy::RoundRobin);
    for node in pool.snapshot().iter().take(5) {
        pool.mark_dead(node.url(), "benchmark");
    }
    group.bench_function("round_robin_half_dead", |b| {
        b.iter(|| black_box(pool.next().into_lease()))
    });

    group.finish();
}

fn bench_liveness(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_liveness");

    let pool = pool(5, SelectionStrategy::RoundRobin);
    let url = pool.snapshot()[0].url().clone();

    group.bench_function("mark_dead_then_alive", |b| {
        b.iter(|| {
            pool.mark_dead(black_box(&url), "benchmark");
            pool.mark_alive(black_box(&url));
        })
    });

    group.bench_function("alive_count", |b| b.iter(|| black_box(pool.alive_count())));

    group.finish();
}

// =============================================================================
// Sniffing
// =============================================================================

fn nodes_info(count: usize) -> Vec<u8> {
    let nodes: serde_json::Map<String, serde_json::Value> = (0..count)
        .map(|i| {
            let roles = if i % 4 == 0 {
                serde_json::json!(["master"])
            } else {
                serde_json::json!(["data", "ingest"])
            };
            (
                format!("node-{}", i),
                serde_json::json!({
                    "name": format!("es-{}", i),
                    "roles": roles,
                    "http": { "publish_address": format!("es-{i}.local/10.0.1.{i}:9200") }
                }),
            )
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({ "nodes": nodes })).unwrap_or_default()
}

fn bench_sniff_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sniff_parse");

    for size in [3, 50] {
        let body = nodes_info(size);
        group.bench_with_input(BenchmarkId::new("exclude_master_only", size), &body, |b, body| {
            b.iter(|| parse_nodes_info(black_box(body), "http", SniffFilter::ExcludeMasterOnly))
        });
    }

    group.bench_function("update_from_sniff", |b| {
        let pool = pool(3, SelectionStrategy::RoundRobin);
        let body = nodes_info(10);
        b.iter(|| {
            let discovered = parse_nodes_info(&body, "http", SniffFilter::All).unwrap_or_default();
            black_box(pool.update_from_sniff(discovered))
        })
    });

    group.finish();
}

criterion_group!(transport_benches, bench_selection, bench_liveness, bench_sniff_parsing);

criterion_main!(transport_benches);
