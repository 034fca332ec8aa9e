use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{DateTime, Duration, TimeZone, Utc};
use medarrival_core::ClientId;
use medarrival_pricing::{PriceComponent, PriceComponentType, get_total_cost, set_amount};
use rust_decimal::Decimal;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A product that has been repriced `revisions` times per component, with a
/// handful of client overrides mixed in.
fn history_with_revisions(revisions: usize, clients: &[ClientId]) -> Vec<PriceComponent> {
    let mut history = Vec::new();
    for i in 0..revisions {
        let now = start() + Duration::hours(i as i64);
        for (n, t) in PriceComponentType::ALL.into_iter().enumerate() {
            let client = match i % 4 {
                0 => clients.get(n % clients.len()).copied(),
                _ => None,
            };
            set_amount(&mut history, t, client, Decimal::new((i * 100 + n) as i64, 2), now).unwrap();
        }
    }
    history
}

fn bench_total_cost(c: &mut Criterion) {
    let clients: Vec<ClientId> = (0..8).map(|_| ClientId::new()).collect();
    let mut group = c.benchmark_group("ledger_total_cost");

    for revisions in [10usize, 100, 1_000] {
        let history = history_with_revisions(revisions, &clients);
        let as_of = start() + Duration::hours(revisions as i64);
        group.throughput(Throughput::Elements(history.len() as u64));

        group.bench_with_input(BenchmarkId::new("default_scope", revisions), &history, |b, h| {
            b.iter(|| get_total_cost(black_box(h), None, as_of))
        });
        group.bench_with_input(BenchmarkId::new("client_scope", revisions), &history, |b, h| {
            b.iter(|| get_total_cost(black_box(h), Some(clients[0]), as_of))
        });
    }

    group.finish();
}

fn bench_set_amount(c: &mut Criterion) {
    let clients: Vec<ClientId> = (0..8).map(|_| ClientId::new()).collect();
    let history = history_with_revisions(500, &clients);
    let now = start() + Duration::days(365);

    c.bench_function("ledger_set_amount_500_revisions", |b| {
        b.iter_batched(
            || history.clone(),
            |mut h| {
                set_amount(&mut h, PriceComponentType::Transport, None, Decimal::new(4200, 2), now).unwrap();
                h
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_total_cost, bench_set_amount);
criterion_main!(benches);
