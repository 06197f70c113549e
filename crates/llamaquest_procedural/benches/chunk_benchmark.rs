//! Benchmark for chunk generation performance.
//!
//! Run with: cargo bench --package llamaquest_procedural --bench chunk_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use llamaquest_procedural::{ChunkCoord, ChunkGenerator, WorldSeed};

fn benchmark_single_chunk(c: &mut Criterion) {
    let gen = ChunkGenerator::with_seed(WorldSeed::new(42));

    c.bench_function("single_chunk_generation", |b| {
        let mut coord = 0i32;
        b.iter(|| {
            coord = coord.wrapping_add(1) % 10_000;
            black_box(gen.generate(ChunkCoord::new(coord, coord / 2)))
        });
    });
}

fn benchmark_chunk_grid(c: &mut Criterion) {
    let gen = ChunkGenerator::with_seed(WorldSeed::new(42));

    let mut group = c.benchmark_group("chunk_grid");
    group.sample_size(20);

    // 16x16 chunks = 256x256 tiles
    group.throughput(Throughput::Elements(16 * 16));
    group.bench_function("16x16_chunks", |b| {
        b.iter(|| {
            for y in 0..16 {
                for x in 0..16 {
                    black_box(gen.generate(ChunkCoord::new(x, y)));
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_single_chunk, benchmark_chunk_grid);
criterion_main!(benches);
