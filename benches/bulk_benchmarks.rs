//! Bulk Benchmarks
//!
//! Operation encoding, buffer assembly and bulk response parsing.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sluice_bulk::{BufferAssembler, BulkItem, BulkOperation, BulkResponse, encode_body};
use std::hint::black_box;

fn operation(i: usize) -> Option<BulkOperation> {
    BulkOperation::index(&serde_json::json!({
        "sku": format!("SKU-{:06}", i),
        "title": "Stainless steel water bottle",
        "price": 19.99,
        "tags": ["outdoor", "kitchen"]
    }))
    .ok()
    .map(|op| op.with_id(i.to_string()))
}

fn items(count: usize) -> Vec<BulkItem> {
    (0..count)
        .filter_map(|i| {
            let op = operation(i)?;
            let encoded = op.encode().ok()?;
            Some(BulkItem::new(i as u64, op, encoded))
        })
        .collect()
}

// =============================================================================
// Encoding
// =============================================================================

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_encode");

    let op = operation(42);
    group.bench_function("operation", |b| {
        b.iter(|| black_box(op.as_ref().map(|op| op.encode())))
    });

    let delete = BulkOperation::delete("42").with_index("products");
    group.bench_function("delete_operation", |b| b.iter(|| black_box(delete.encode())));

    for size in [100, 1_000] {
        let items = items(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("body", size), &items, |b, items| {
            b.iter(|| black_box(encode_body(items.iter())))
        });
    }

    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_assemble");

    for buffer_size in [100, 1_000] {
        group.throughput(Throughput::Elements(5_000));
        group.bench_with_input(
            BenchmarkId::new("buffer_size", buffer_size),
            &buffer_size,
            |b, &buffer_size| {
                b.iter_batched(
                    || items(5_000),
                    |items| {
                        let mut assembler = BufferAssembler::new(buffer_size, 5 * 1024 * 1024);
                        let mut buffers = 0;
                        for item in items {
                            if assembler.push(item).is_some() {
                                buffers += 1;
                            }
                        }
                        if assembler.finish().is_some() {
                            buffers += 1;
                        }
                        black_box(buffers)
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

// =============================================================================
// Responses
// =============================================================================

fn response_body(count: usize, failed_every: usize) -> Vec<u8> {
    let items: Vec<_> = (0..count)
        .map(|i| {
            if i % failed_every == 0 {
                serde_json::json!({ "index": {
                    "_index": "products", "_id": i.to_string(), "status": 429,
                    "error": { "type": "es_rejected_execution_exception", "reason": "queue full" }
                }})
            } else {
                serde_json::json!({ "index": {
                    "_index": "products", "_id": i.to_string(), "_version": 1,
                    "result": "created", "status": 201
                }})
            }
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({ "took": 30, "errors": true, "items": items }))
        .unwrap_or_default()
}

fn bench_response_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_response");

    for size in [100, 1_000] {
        let body = response_body(size, 10);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("parse", size), &body, |b, body| {
            b.iter(|| black_box(serde_json::from_slice::<BulkResponse>(body).ok()))
        });
    }

    group.finish();
}

criterion_group!(bulk_benches, bench_encoding, bench_assembly, bench_response_parsing);

criterion_main!(bulk_benches);
