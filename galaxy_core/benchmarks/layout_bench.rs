use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use galaxy_core::{
    CachedLayout, LayoutConfig, LayoutEngine, MemoryStore, OrbitalLayoutEngine, PositionCache,
};
use galaxy_schema::Artist;

const GENRES: [&str; 7] = ["pop", "rock", "jazz", "techno", "folk", "hip hop", "ambient"];

fn roster(count: usize) -> Vec<Artist> {
    (0..count)
        .map(|i| {
            Artist::new(
                format!("artist-{i:04}"),
                format!("Artist {i}"),
                vec![
                    GENRES[i % GENRES.len()].to_string(),
                    GENRES[(i * 5 + 2) % GENRES.len()].to_string(),
                ],
                100.0 - (i as f32 * 100.0 / count as f32),
            )
        })
        .collect()
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let config = LayoutConfig::default();

    for size in [50usize, 100, 200] {
        let artists = roster(size);
        group.bench_with_input(BenchmarkId::new("orbital", size), &artists, |b, artists| {
            b.iter(|| OrbitalLayoutEngine.layout(artists, &config))
        });

        group.bench_with_input(BenchmarkId::new("cached_hit", size), &artists, |b, artists| {
            b.iter_batched(
                || {
                    let mut layout = CachedLayout::new(
                        OrbitalLayoutEngine,
                        PositionCache::new(Arc::new(MemoryStore::new())),
                    );
                    layout.compute_layout("bench", artists, &config);
                    layout
                },
                |mut layout| layout.compute_layout("bench", artists, &config),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(layout_benches, bench_layout);
criterion_main!(layout_benches);
