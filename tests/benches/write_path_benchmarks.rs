//! # Replica Write Path Benchmarks
//!
//! | Benchmark | What it measures |
//! |-----------|------------------|
//! | evaluate/one_phase | Evaluating a complete transaction on the fast path |
//! | evaluate/intents | Evaluating the same writes as a pending transaction |
//! | evaluate/serverside_retry | A non-transactional write retried above a newer value |
//! | execute/put | Latch, lease, propose and apply one write to a random key |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kv_tests::integration::harness::{one_pc_batch, txn_at, TestNode, RANGE_ID, RANGE_END, RANGE_START};
use replica_write::adapters::InMemoryEngine;
use replica_write::application::{BatchEvaluator, EvalContext};
use replica_write::domain::{MvccStats, RangeDescriptor};
use replica_write::ports::{EngineBatch, StorageEngine};
use rand::Rng;
use replica_write::{BatchRequest, EndTxnRequest, Request, SpanSet, WriteConfig};
use shared_types::{Key, Timestamp};
use std::sync::Arc;
use std::time::Duration;

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("b{i:05}")).collect()
}

fn evaluate(evaluator: &BatchEvaluator, desc: &RangeDescriptor, mut ba: BatchRequest) {
    let spans = SpanSet::for_batch(&ba);
    let rec = EvalContext { desc, spans: &spans };
    let eval = evaluator.evaluate_write_batch(&rec, &mut ba);
    eval.batch.close();
    black_box(eval.outcome.is_ok());
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.measurement_time(Duration::from_secs(5));

    let engine = InMemoryEngine::new();
    let evaluator = BatchEvaluator::new(Arc::new(engine.clone()), &WriteConfig::default());
    let desc = RangeDescriptor::new(RANGE_ID, RANGE_START, RANGE_END);

    for size in [1usize, 10, 100] {
        let names = keys(size);
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("one_phase", size), &refs, |b, refs| {
            b.iter(|| {
                let txn = txn_at(refs[0], Timestamp::new(2_000, 0));
                evaluate(&evaluator, &desc, one_pc_batch(txn, refs, EndTxnRequest::commit()))
            })
        });

        group.bench_with_input(BenchmarkId::new("intents", size), &refs, |b, refs| {
            b.iter(|| {
                let txn = txn_at(refs[0], Timestamp::new(2_000, 0));
                let ba = refs.iter().fold(BatchRequest::transactional(RANGE_ID, txn), |ba, k| {
                    ba.with(Request::put(*k, "v"))
                });
                evaluate(&evaluator, &desc, ba)
            })
        });
    }

    // Every iteration hits the newer value and retries once above it.
    let mut seed = engine.new_batch();
    seed.mvcc_put(
        &mut MvccStats::default(),
        &Key::from("c"),
        Timestamp::new(3_000, 0),
        Some(b"newer".to_vec()),
        None,
    )
    .unwrap();
    seed.commit().unwrap();
    group.bench_function("serverside_retry", |b| {
        b.iter(|| {
            let ba = BatchRequest::new(RANGE_ID, Timestamp::new(2_000, 0)).with(Request::put("c", "v"));
            evaluate(&evaluator, &desc, ba)
        })
    });

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let node = rt.block_on(async { TestNode::start() });

    let mut group = c.benchmark_group("execute");
    group.throughput(Throughput::Elements(1));
    let mut rng = rand::thread_rng();
    let mut wall = 2_000u64;
    group.bench_function("put", |b| {
        b.iter(|| {
            wall += 1;
            let key = format!("d{:04}", rng.gen_range(0..1_000));
            rt.block_on(node.put(&key, "v", Timestamp::new(wall, 0))).unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, bench_evaluation, bench_execute);
criterion_main!(benches);
