//! Benchmark suite for adm-engine
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use adm_engine::adm::config::AdmConfig;
use adm_engine::adm::persistence::MemoryStore;
use adm_engine::adm::types::{DomTargetType, RoundInput};
use adm_engine::adm::{AdmEngine, EngineServices, ManualClock};

const NOW: i64 = 1_700_000_000_000;

fn warmed_engine(profiling: bool) -> (AdmEngine, Arc<ManualClock>) {
    let mut config = AdmConfig::default();
    config.feature_flags.dom_profiling_enabled = profiling;
    let clock = Arc::new(ManualClock::new(NOW));
    let services = EngineServices::new(Arc::new(MemoryStore::new())).with_clock(clock.clone());
    let mut engine = AdmEngine::new(config, "bench", services).unwrap();
    for _ in 0..200 {
        engine.record_round(&RoundInput::default());
        clock.advance_secs(30);
    }
    (engine, clock)
}

fn bench_record_round_profiling(c: &mut Criterion) {
    let (mut engine, clock) = warmed_engine(true);
    c.bench_function("AdmEngine::record_round (profiling)", |b| {
        b.iter(|| {
            clock.advance_secs(30);
            black_box(engine.record_round(black_box(&RoundInput::default())))
        })
    });
}

fn bench_record_round_global(c: &mut Criterion) {
    let (mut engine, clock) = warmed_engine(false);
    c.bench_function("AdmEngine::record_round (global)", |b| {
        b.iter(|| {
            clock.advance_secs(30);
            black_box(engine.record_round(black_box(&RoundInput::default())))
        })
    });
}

fn bench_modulate_full_profiles(c: &mut Criterion) {
    let (mut engine, _) = warmed_engine(true);
    c.bench_function("AdmEngine::modulate_doms_with_profiling", |b| {
        b.iter(|| black_box(engine.modulate_doms_with_profiling(black_box(0.5))))
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let (engine, _) = warmed_engine(true);
    c.bench_function("AdmEngine::snapshot", |b| {
        b.iter(|| black_box(engine.snapshot()))
    });
    c.bench_function("AdmEngine::game_parameter", |b| {
        b.iter(|| black_box(engine.game_parameter(DomTargetType::MeanBallSpeed)))
    });
}

criterion_group!(
    benches,
    bench_record_round_profiling,
    bench_record_round_global,
    bench_modulate_full_profiles,
    bench_snapshot
);
criterion_main!(benches);
