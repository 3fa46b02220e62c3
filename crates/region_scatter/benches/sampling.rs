mod common;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use region_scatter::prelude::*;

const GRANULARITIES: [f64; 3] = [2.0, 1.0, 0.5];
const DRAWS: usize = 1000;

fn annulus() -> PolygonWithHoles2 {
    PolygonWithHoles2::new(
        Polygon2::from_points([(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)]),
        vec![Polygon2::from_points([
            (8.0, 8.0),
            (12.0, 8.0),
            (12.0, 12.0),
            (8.0, 12.0),
        ])],
    )
}

fn hole_boundary() -> Vec<Segment2> {
    annulus().holes()[0].edge_segments().collect()
}

fn generator_build_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling/generator_build");
    for &granularity in &GRANULARITIES {
        let params = BiasParams::new(granularity)
            .with_distance_saturation(0.5)
            .with_attraction_factor(1.0);
        group.bench_with_input(
            BenchmarkId::from_parameter(granularity),
            &granularity,
            |b, _| {
                b.iter(|| {
                    let generator =
                        BiasedPositionGenerator::new(annulus(), &hole_boundary(), &params)
                            .expect("valid generator");
                    black_box(generator.mesh().triangle_count());
                });
            },
        );
    }
    group.finish();
}

fn generator_draw_benches(c: &mut Criterion) {
    let params = BiasParams::new(0.5)
        .with_distance_saturation(0.5)
        .with_attraction_factor(1.0);
    let generator = BiasedPositionGenerator::new(annulus(), &hole_boundary(), &params)
        .expect("valid generator");
    let mut rng = StdRng::seed_from_u64(0xA11CE);

    let mut group = c.benchmark_group("sampling/generator_draw");
    group.throughput(common::elements_throughput(DRAWS));
    group.bench_function("annulus", |b| {
        b.iter(|| {
            for _ in 0..DRAWS {
                black_box(generator.get_random_position_with(&mut rng));
            }
        });
    });
    group.finish();
}

fn grid_draw_benches(c: &mut Criterion) {
    let params = GridParams::new(0.5)
        .with_distance_saturation(0.5)
        .with_attraction_factor(1.0)
        .with_min_distance(0.25);
    let regions = vec![annulus()];
    let grid =
        BiasedPositionGrid::new(&regions, &hole_boundary(), &params).expect("valid grid");
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    let mut group = c.benchmark_group("sampling/grid_draw");
    group.throughput(common::elements_throughput(DRAWS));
    group.bench_function("annulus", |b| {
        b.iter(|| {
            for _ in 0..DRAWS {
                black_box(grid.get_random_position(&mut rng, 1000));
            }
        });
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = generator_build_benches, generator_draw_benches, grid_draw_benches
}
criterion_main!(benches);
