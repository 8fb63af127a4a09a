//! # Sync Benchmarks
//!
//! | Path | Measured |
//! |------|----------|
//! | Block codec | Decode of one wire block |
//! | Signature | Producer signature check against the previous header |
//! | Catch-up | Full coordinator pass over an in-memory peer |
//! | Fork | Resolution of a two-block fork |

use chain_sync::domain::codec;
use chain_sync::test_utils::{ChainFixture, TestNode};
use chain_sync::{ProducerKeys, SyncCoordinator};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let fixture = ChainFixture::new(3).with_blocks(4);
    let raw = fixture.raw_blocks()[3].clone();
    let producers = fixture.producers();

    let mut group = c.benchmark_group("codec");
    group.bench_function("decode", |b| b.iter(|| codec::decode(black_box(&raw))));

    let mut block = codec::decode(&raw).unwrap();
    block.prev_header = Some(fixture.header(3));
    let key = producers.public_key(block.header.node_position).unwrap();
    group.bench_function("verify_signature", |b| {
        b.iter(|| codec::verify_signature(black_box(&block), &key))
    });
    group.finish();
}

// ============================================================================
// Sync passes
// ============================================================================

fn bench_catch_up(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("catch_up");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for blocks in [16usize, 64] {
        let fixture = ChainFixture::new(3).with_blocks(blocks + 1);
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &fixture, |b, fixture| {
            b.iter_batched(
                || {
                    let node = TestNode::with_chain(fixture, 1);
                    node.serve(fixture);
                    node
                },
                |node| {
                    let coordinator = SyncCoordinator::new(node.deps.clone(), node.config.clone());
                    runtime
                        .block_on(coordinator.trigger(&CancellationToken::new()))
                        .unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_fork(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let local = ChainFixture::new(3).with_blocks(20);
    let fork = local.diverge_at(19).with_blocks(3);

    c.bench_function("fork/two_block_tail", |b| {
        b.iter_batched(
            || {
                let node = TestNode::with_chain(&local, 20);
                node.serve(&fork);
                node
            },
            |node| {
                let coordinator = SyncCoordinator::new(node.deps.clone(), node.config.clone());
                runtime
                    .block_on(coordinator.trigger(&CancellationToken::new()))
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_codec, bench_catch_up, bench_fork);
criterion_main!(benches);
