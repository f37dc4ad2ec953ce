use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracegram::{TraceEvent, TraceGrammar};

/// A request-handling loop: the same controller sequence over and over.
fn generate_repetitive_trace(size: usize) -> Vec<TraceEvent> {
    let pattern = [
        ("shop.CheckoutController", "login"),
        ("shop.CartController", "loadCart"),
        ("shop.CartController", "addItem"),
        ("shop.OrderController", "placeOrder"),
        ("shop.OrderController", "confirm"),
    ];

    (0..size)
        .map(|i| {
            let (owner, member) = pattern[i % pattern.len()];
            TraceEvent::new(owner, member, vec![])
        })
        .collect()
}

/// Tight polling loops interleaved with occasional bursts of other work.
fn generate_loop_heavy_trace(size: usize) -> Vec<TraceEvent> {
    let mut events = Vec::with_capacity(size);
    let mut i = 0usize;
    while events.len() < size {
        for _ in 0..64 {
            events.push(TraceEvent::new("shop.InventoryService", "poll", vec![]));
        }
        let member = ["restock", "audit", "report"][i % 3];
        events.push(TraceEvent::new("shop.InventoryService", member, vec![]));
        i += 1;
    }
    events.truncate(size);
    events
}

/// Barely repetitive input, the worst case for grammar induction.
fn generate_low_repetition_trace(size: usize) -> Vec<TraceEvent> {
    let mut seed = 12345u64;
    (0..size)
        .map(|_| {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            TraceEvent::new(
                format!("gen.Service{}", seed % 31),
                format!("op{}", (seed >> 8) % 17),
                vec![],
            )
        })
        .collect()
}

fn bench_append(c: &mut Criterion) {
    let sizes = [1_000, 10_000, 100_000];
    let mut group = c.benchmark_group("append");

    for size in sizes.iter() {
        let repetitive = generate_repetitive_trace(*size);
        group.bench_with_input(
            BenchmarkId::new("repetitive", size),
            &repetitive,
            |b, events| {
                b.iter(|| {
                    let mut grammar = TraceGrammar::new();
                    grammar
                        .append_all(black_box(events.iter().cloned()))
                        .unwrap();
                    black_box(grammar)
                });
            },
        );

        let loop_heavy = generate_loop_heavy_trace(*size);
        group.bench_with_input(
            BenchmarkId::new("loop_heavy", size),
            &loop_heavy,
            |b, events| {
                b.iter(|| {
                    let mut grammar = TraceGrammar::new();
                    grammar
                        .append_all(black_box(events.iter().cloned()))
                        .unwrap();
                    black_box(grammar)
                });
            },
        );

        let low_repetition = generate_low_repetition_trace(*size);
        group.bench_with_input(
            BenchmarkId::new("low_repetition", size),
            &low_repetition,
            |b, events| {
                b.iter(|| {
                    let mut grammar = TraceGrammar::new();
                    grammar
                        .append_all(black_box(events.iter().cloned()))
                        .unwrap();
                    black_box(grammar)
                });
            },
        );
    }

    group.finish();
}

fn bench_expansion(c: &mut Criterion) {
    let sizes = [1_000, 10_000, 100_000];
    let mut group = c.benchmark_group("expansion");

    for size in sizes.iter() {
        let mut grammar = TraceGrammar::new();
        grammar
            .append_all(generate_repetitive_trace(*size))
            .unwrap();

        group.bench_with_input(BenchmarkId::new("iter", size), &grammar, |b, grammar| {
            b.iter(|| {
                let count: usize = black_box(grammar.iter().count());
                black_box(count)
            });
        });

        let snapshot = grammar.snapshot();
        group.bench_with_input(
            BenchmarkId::new("snapshot_expand", size),
            &snapshot,
            |b, snapshot| {
                b.iter(|| {
                    let count: usize = black_box(snapshot.expand().count());
                    black_box(count)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_expansion);
criterion_main!(benches);
