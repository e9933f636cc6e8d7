//! Benchmarks for the clock engine

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use stratus_core::{AtomicPackedClock, PackedClock};
use stratus_time::{ClockConfig, ClockEngine, ClockSource, IsoTimeCache, ManualClockSource};

fn bench_packed_clock_ops(c: &mut Criterion) {
    let t = PackedClock::new(1_700_000_000, 999_999);

    c.bench_function("packed_clock_add", |b| {
        b.iter(|| black_box(t).saturating_add(black_box(Duration::from_micros(1))))
    });

    c.bench_function("packed_clock_sub", |b| {
        let earlier = PackedClock::new(1_699_999_999, 1);
        b.iter(|| black_box(t) - black_box(earlier))
    });
}

fn bench_fetch_advance(c: &mut Criterion) {
    let global = AtomicPackedClock::new(PackedClock::new(1_700_000_000, 0));
    let mut next = PackedClock::new(1_700_000_000, 0);

    c.bench_function("global_fetch_advance", |b| {
        b.iter(|| {
            next = next.saturating_add(Duration::from_micros(1));
            global.fetch_advance(black_box(next))
        })
    });
}

fn bench_update_date(c: &mut Criterion) {
    let source = Arc::new(ManualClockSource::new(
        PackedClock::new(1_700_000_000, 0),
        PackedClock::new(100, 0),
    ));
    let engine = ClockEngine::new(source.clone() as Arc<dyn ClockSource>, ClockConfig::default());
    let mut clock = engine.register_thread();

    c.bench_function("thread_update_date", |b| {
        b.iter(|| {
            source.advance(Duration::from_micros(10));
            clock.update_date(black_box(Duration::ZERO), true)
        })
    });

    c.bench_function("thread_poll_cycle", |b| {
        b.iter(|| {
            clock.entering_poll();
            source.advance(Duration::from_micros(50));
            clock.update_date(Duration::from_millis(1), false);
            clock.leaving_poll(Duration::from_millis(1), false);
        })
    });
}

fn bench_iso_format(c: &mut Criterion) {
    let mut cache = IsoTimeCache::new();
    let mut date = PackedClock::new(1_700_000_000, 0);

    c.bench_function("iso_format_same_second", |b| {
        b.iter(|| cache.format(black_box(date), false))
    });

    c.bench_function("iso_format_new_second", |b| {
        b.iter(|| {
            date = date.saturating_add(Duration::from_secs(1));
            cache.format(black_box(date), true)
        })
    });
}

criterion_group!(
    benches,
    bench_packed_clock_ops,
    bench_fetch_advance,
    bench_update_date,
    bench_iso_format,
);

criterion_main!(benches);
