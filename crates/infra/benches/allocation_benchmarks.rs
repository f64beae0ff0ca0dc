use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, NaiveDate};
use hemobank_core::{BloodType, Volume};
use hemobank_infra::bootstrap::AllocationEngine;
use hemobank_infra::inventory_store::InMemoryInventoryStore;
use hemobank_inventory::CompatibilityRegistry;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

/// `lots_per_type` lots for every type except the recipient, so resolution has
/// to walk the substitute graph.
fn stocked_engine(
    rt: &Runtime,
    recipient: BloodType,
    lots_per_type: usize,
) -> AllocationEngine<InMemoryInventoryStore> {
    let engine =
        AllocationEngine::new(InMemoryInventoryStore::new(), CompatibilityRegistry::default());
    let base = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    rt.block_on(async {
        for t in BloodType::ALL.iter().copied().filter(|t| *t != recipient) {
            for i in 0..lots_per_type {
                let expiry = base + Duration::days(i as i64);
                engine
                    .store()
                    .register_lot(t, Volume::from_whole_ml(5), expiry)
                    .await
                    .unwrap();
            }
        }
    });
    engine
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let rt = runtime();

    for lots in [10usize, 100, 1000].iter() {
        let engine = stocked_engine(&rt, BloodType::AbPos, *lots);
        group.bench_with_input(BenchmarkId::new("ab_pos_via_substitutes", lots), lots, |b, _| {
            b.iter(|| {
                let requested = black_box(Volume::from_whole_ml(40));
                rt.block_on(engine.resolver().resolve(BloodType::AbPos, requested))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    let rt = runtime();

    for lots in [10usize, 100, 1000].iter() {
        // Deplete half the compatible lots in one request.
        let requested = Volume::from_whole_ml(5 * (*lots as u64) / 2 + 1);
        group.throughput(Throughput::Elements(*lots as u64));
        group.bench_with_input(BenchmarkId::new("o_neg_earliest_expiry", lots), lots, |b, &count| {
            b.iter_batched(
                || stocked_engine(&rt, BloodType::OPos, count),
                |engine| {
                    rt.block_on(engine.committer().allocate(BloodType::ONeg, black_box(requested)))
                        .unwrap()
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollback");
    let rt = runtime();

    group.bench_function("shortfall_after_scanning_all_lots", |b| {
        b.iter_batched(
            || stocked_engine(&rt, BloodType::OPos, 100),
            |engine| {
                let requested = black_box(Volume::from_whole_ml(1_000_000));
                rt.block_on(engine.committer().allocate(BloodType::AbNeg, requested))
                    .unwrap_err()
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_allocate, bench_rollback);
criterion_main!(benches);
