//! Throughput of the indicator engine hot path

use criterion::{Criterion, criterion_group, criterion_main};
use features::FeatureEngine;
use std::hint::black_box;

fn bench_update(c: &mut Criterion) {
    c.bench_function("update_and_materialize_100k_bars", |b| {
        b.iter(|| {
            let mut engine = FeatureEngine::new();
            engine.require_ema(50);
            engine.require_ema(200);
            engine.require_atr(14);

            let mut close = 1.1000;
            for i in 0..100_000u32 {
                // deterministic zig-zag walk
                close += if i % 3 == 0 { 0.0003 } else { -0.0001 };
                engine.update(close, close + 0.0005, close - 0.0005, close, 100.0);
                engine.append_history();
            }
            black_box(engine.bars_seen())
        });
    });
}

criterion_group!(benches, bench_update);
criterion_main!(benches);
