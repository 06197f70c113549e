//! Benchmark for path search performance.
//!
//! TARGET: a 64-tile crossing of mixed terrain well inside one frame
//!
//! Run with: cargo bench --package llamaquest_pathfinding --bench path_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use llamaquest_pathfinding::{find_path, AgentProfile, Connectivity, GridTerrain, PathRequest, PathSearch};
use llamaquest_procedural::{Biome, TilePos};

fn create_test_grid() -> GridTerrain {
    let mut grid = GridTerrain::new(64, 64, Biome::Village);

    // Staggered mountain ridges with water gaps
    for ridge in (8..64).step_by(8) {
        for y in 0..60 {
            let y = if (ridge / 8) % 2 == 0 { y } else { y + 4 };
            grid.set_biome(TilePos::new(ridge, y), Biome::Mountains);
        }
        grid.set_biome(TilePos::new(ridge - 1, 32), Biome::Water);
    }
    for x in 0..64 {
        grid.set_biome(TilePos::new(x, 20), Biome::Forest);
    }

    grid
}

fn benchmark_full_search(c: &mut Criterion) {
    let grid = create_test_grid();
    let request = PathRequest::new(TilePos::new(0, 0), TilePos::new(63, 63), AgentProfile::default(), 100_000);
    let diagonal = request.clone().with_connectivity(Connectivity::Eight);

    c.bench_function("path_64x64_four", |b| {
        b.iter(|| black_box(find_path(&grid, black_box(&request))));
    });

    c.bench_function("path_64x64_eight", |b| {
        b.iter(|| black_box(find_path(&grid, black_box(&diagonal))));
    });
}

fn benchmark_sliced_search(c: &mut Criterion) {
    let grid = create_test_grid();
    let request = PathRequest::new(TilePos::new(0, 0), TilePos::new(63, 63), AgentProfile::default(), 100_000);

    c.bench_function("path_64x64_quota_64", |b| {
        b.iter(|| {
            let mut search = PathSearch::new(request.clone());
            while !search.is_finished() {
                black_box(search.step(&grid, 64));
            }
        });
    });
}

criterion_group!(benches, benchmark_full_search, benchmark_sliced_search);
criterion_main!(benches);
