use std::hint::black_box;
use std::time::{Duration, Instant};

use galaxy_common::{EntityId, EntityKind, EntityMeta};
use galaxy_spatial::{SpatialConfig, SpatialIndex};
use glam::Vec3;

fn make_index(entity_count: usize, half_extent: f32) -> SpatialIndex {
    let mut index = SpatialIndex::new(SpatialConfig::default());
    let side = (entity_count as f32).cbrt().ceil() as usize;
    let step = 2.0 * half_extent / side as f32;
    for i in 0..entity_count {
        let x = (i % side) as f32 * step - half_extent;
        let y = ((i / side) % side) as f32 * step - half_extent;
        let z = (i / (side * side)) as f32 * step - half_extent;
        let _ = index.add_entity(
            EntityId::new(format!("e{i}")),
            Vec3::new(x, y, z),
            1.0 + (i % 7) as f32,
            EntityMeta::new(EntityKind::ALL[i % EntityKind::ALL.len()]),
        );
    }
    index
}

fn bench_insert(entity_count: usize, iterations: usize) {
    let start = Instant::now();
    for _ in 0..iterations {
        black_box(make_index(black_box(entity_count), 5000.0));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  insert ({entity_count} entities, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_query_visible(entity_count: usize, zoom: f32, iterations: usize) {
    let mut index = make_index(entity_count, 5000.0);
    let t0 = Instant::now();

    // Each iteration lands past the cache validity window, so every query scans.
    let start = Instant::now();
    for i in 0..iterations {
        let now = t0 + Duration::from_secs(i as u64);
        let viewpoint = Vec3::new((i % 50) as f32 * 40.0, 0.0, 0.0);
        black_box(index.query_visible(black_box(viewpoint), zoom, None, now));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  query_visible ({entity_count} entities, zoom {zoom}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_query_visible_cached(entity_count: usize, iterations: usize) {
    let mut index = make_index(entity_count, 5000.0);
    let now = Instant::now();

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(index.query_visible(black_box(Vec3::ZERO), 1.0, None, now));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  query_visible cached ({entity_count} entities, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_query_radius(entity_count: usize, radius: f32, iterations: usize) {
    let index = make_index(entity_count, 5000.0);

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(index.query_radius(black_box(Vec3::ZERO), black_box(radius), None));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  query_radius ({entity_count} entities, r={radius}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_update_churn(entity_count: usize, iterations: usize) {
    let mut index = make_index(entity_count, 5000.0);
    let ids: Vec<EntityId> = (0..entity_count).map(|i| EntityId::new(format!("e{i}"))).collect();

    let start = Instant::now();
    for i in 0..iterations {
        let id = &ids[i % ids.len()];
        let offset = (i % 13) as f32 * 37.0;
        index.update_entity(id, black_box(Vec3::new(offset, -offset, offset)), None);
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  update ({entity_count} entities, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Spatial Index Benchmarks ===\n");

    println!("Insert:");
    bench_insert(1000, 100);
    bench_insert(10000, 10);

    println!("\nVisible query (cold cache):");
    bench_query_visible(10000, 1.0, 200);
    bench_query_visible(10000, 4.0, 1000);
    bench_query_visible(10000, 0.25, 50);

    println!("\nVisible query (warm cache):");
    bench_query_visible_cached(10000, 10000);

    println!("\nRadius query:");
    bench_query_radius(10000, 200.0, 1000);
    bench_query_radius(10000, 1000.0, 200);

    println!("\nUpdate churn:");
    bench_update_churn(10000, 100000);

    println!("\n=== Done ===");
}
