//! Normalized store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use confsync_core::{CollectionKey, NormalizedStore};
use confsync_proto::{FilterResult, Page, Visibility};

fn filter_row(id: usize, revision: usize) -> FilterResult {
    FilterResult {
        id: format!("filter-{}", id),
        name: format!("filter {} rev {}", id, revision),
        filter_file: "apiVersion: v1".to_string(),
        visibility: Visibility::Private,
        catalog_data: None,
        user_id: "user-1".to_string(),
        created_at: Some("2024-01-01T00:00:00Z".to_string()),
        updated_at: None,
    }
}

fn page(size: usize, offset: usize, revision: usize) -> Page<FilterResult> {
    let rows = (offset..offset + size).map(|id| filter_row(id, revision)).collect();
    Page::from_rows(1, size as u64, (size * 4) as u64, rows)
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/apply");

    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("identical", size), &size, |b, &size| {
            let store = NormalizedStore::new();
            let key = CollectionKey::unscoped("filters");
            let snapshot = page(size, 0, 0);
            store.apply(&key, &snapshot);

            b.iter(|| black_box(store.apply(&key, &snapshot)));
        });

        group.bench_with_input(BenchmarkId::new("half_shifted", size), &size, |b, &size| {
            let store = NormalizedStore::new();
            let key = CollectionKey::unscoped("filters");
            let first = page(size, 0, 0);
            let second = page(size, size / 2, 1);

            b.iter(|| {
                store.apply(&key, &first);
                black_box(store.apply(&key, &second))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_apply);
criterion_main!(benches);
