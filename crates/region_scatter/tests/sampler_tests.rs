//! Scenario tests for the mesh-based biased position generator.
mod common;

use rand::rngs::StdRng;
use rand::SeedableRng;
use region_scatter::prelude::*;

fn unit_square() -> Polygon2 {
    Polygon2::from_points([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
}

fn segment(ax: f64, ay: f64, bx: f64, by: f64) -> Segment2 {
    Segment2::new(Point2::new(ax, ay), Point2::new(bx, by))
}

fn min_distance(segments: &[Segment2], p: Point2) -> f64 {
    segments
        .iter()
        .map(|s| s.distance_sqrd_to(p).sqrt())
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn unit_square_without_attractors_samples_uniformly() {
    // A dummy attractive segment far beyond any influence.
    let far = vec![segment(200.0, 0.0, 201.0, 0.0)];
    let params = BiasParams::new(0.1)
        .with_distance_saturation(1.0)
        .with_attraction_factor(0.0);
    let generator =
        BiasedPositionGenerator::new(unit_square(), &far, &params).expect("valid generator");

    let n = 100_000;
    let mut rng = StdRng::seed_from_u64(42);
    let mut marginals = Vec::with_capacity(2 * n);
    let cmp = ToleranceCompare::new(1e-9);
    let square: PolygonWithHoles2 = unit_square().into();
    for _ in 0..n {
        let p = generator.get_random_position_with(&mut rng);
        assert!(square.contains(p, &cmp), "{p:?} escaped the boundary");
        marginals.push(p.x);
        marginals.push(p.y);
    }

    let d = common::ks_statistic_uniform(&mut marginals);
    let p_value = common::ks_pvalue(d, marginals.len());
    assert!(p_value > 0.05, "KS p-value {p_value} (d = {d})");
}

#[test]
fn center_attractor_keeps_the_mean_centered() {
    let attractor = vec![segment(0.5, 0.0, 0.5, 1.0)];
    let params = BiasParams::new(0.1)
        .with_distance_saturation(0.01)
        .with_attraction_factor(10.0);
    let generator =
        BiasedPositionGenerator::new(unit_square(), &attractor, &params).expect("valid generator");

    let n = 100_000;
    let mut rng = StdRng::seed_from_u64(42);
    let xs: Vec<f64> = (0..n)
        .map(|_| generator.get_random_position_with(&mut rng).x)
        .collect();
    let mean_x = common::mean(&xs);
    assert!(
        (mean_x - 0.5).abs() < 0.01,
        "mean x {mean_x} drifted from the attractor"
    );
}

#[test]
fn attraction_concentrates_density_near_the_segment() {
    // A larger domain so the Steiner refinement can resolve the weight decay.
    let boundary = Polygon2::from_points([(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
    let attractor = vec![segment(5.0, 2.0, 5.0, 8.0)];
    let params = BiasParams::new(0.5)
        .with_distance_saturation(0.1)
        .with_attraction_factor(2.0);
    let generator =
        BiasedPositionGenerator::new(boundary, &attractor, &params).expect("valid generator");

    let n = 20_000;
    let mut rng = StdRng::seed_from_u64(7);
    let mut near = 0usize;
    for _ in 0..n {
        let p = generator.get_random_position_with(&mut rng);
        if min_distance(&attractor, p) < 2.0 {
            near += 1;
        }
    }
    // The near band holds a fifth of the area but nearly all of the weight.
    assert!(
        near as f64 > 0.8 * n as f64,
        "only {near}/{n} samples near the attractor"
    );
}

#[test]
fn annulus_hole_is_never_sampled_and_attracts_density() {
    let outer = Polygon2::from_points([(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
    let hole = Polygon2::from_points([(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0)]);
    let hole_boundary: Vec<Segment2> = hole.edge_segments().collect();
    let region = PolygonWithHoles2::new(outer, vec![hole.clone()]);

    let params = BiasParams::new(0.5)
        .with_distance_saturation(0.5)
        .with_attraction_factor(5.0);
    let generator = BiasedPositionGenerator::new(region.clone(), &hole_boundary, &params)
        .expect("valid generator");

    let n = 100_000;
    let mut rng = StdRng::seed_from_u64(42);
    let cmp = ToleranceCompare::new(1e-9);
    let mut near = 0usize;
    let mut far = 0usize;
    for _ in 0..n {
        let p = generator.get_random_position_with(&mut rng);
        assert!(region.contains(p, &cmp), "{p:?} escaped the region");
        assert!(
            !(hole.contains(p, &cmp) && !hole.on_boundary(p, &cmp)),
            "{p:?} landed strictly inside the hole"
        );
        let d = min_distance(&hole_boundary, p);
        if d < 1.0 {
            near += 1;
        } else if d > 2.0 {
            far += 1;
        }
    }
    assert!(
        near as f64 > 0.9 * n as f64,
        "only {near}/{n} samples within 1 m of the hole"
    );
    assert!(
        (far as f64) < 0.01 * n as f64,
        "{far}/{n} samples further than 2 m from the hole"
    );
}

#[test]
fn cumulative_weights_are_monotone_over_a_refined_mesh() {
    let boundary = Polygon2::from_points([(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
    let attractor = vec![segment(5.0, 2.0, 5.0, 8.0)];
    let params = BiasParams::new(0.5)
        .with_distance_saturation(0.1)
        .with_attraction_factor(2.0);
    let generator =
        BiasedPositionGenerator::new(boundary, &attractor, &params).expect("valid generator");

    let mesh = generator.mesh();
    assert!(mesh.weights().iter().all(|&w| w >= 0.0));
    assert!(mesh.cumulative().windows(2).all(|w| w[0] <= w[1]));
    let last = *mesh.cumulative().last().expect("non-empty mesh");
    assert!((last - mesh.total_weight()).abs() <= f64::EPSILON * last);
    assert!((mesh.area() - 100.0).abs() < 1e-6);
}

#[test]
fn adjacency_matrix_is_cached_and_consistent() {
    let far = vec![segment(200.0, 0.0, 201.0, 0.0)];
    let params = BiasParams::new(0.25).with_attraction_factor(0.0);
    let generator =
        BiasedPositionGenerator::new(unit_square(), &far, &params).expect("valid generator");

    let mesh = generator.mesh();
    let adjacency = mesh.adjacency();
    assert_eq!(adjacency.len(), mesh.triangle_count());
    for (t, neighbors) in adjacency.iter().enumerate() {
        for neighbor in neighbors.iter().flatten() {
            assert!(adjacency[*neighbor].iter().flatten().any(|&back| back == t));
        }
    }
}
