//! Mesh-based biased position generator.
//!
//! Construction triangulates the boundary region with the `spade` constrained
//! Delaunay triangulator, refined by grid-aligned Steiner points away from the
//! attractive geometry, and hands the triangles to a [`WeightedMesh`] whose
//! weight policy pulls sampling density towards the attractive set.
use std::collections::BTreeSet;

use mint::Vector2;
use ordered_float::OrderedFloat;
use rand::RngCore;
use spade::{ConstrainedDelaunayTriangulation, InsertionError, Point2 as SpadePoint, Triangulation};
use tracing::{info, warn};

use crate::bsp::{SolidBsp, SplitStrategy};
use crate::error::{Error, Result};
use crate::geometry::{
    point_in_triangle, triangle_centroid, Grid, Point2, Polygon2, PolygonWithHoles2, Segment2,
    ToleranceCompare,
};
use crate::mesh::{Triangle, WeightedMesh};
use crate::sampling::{rand01, RandomPosition};

/// Squared clearance around the attractive geometry inside which no Steiner
/// points are inserted, in square metres. The coarse triangulation already
/// resolves the near field; refinement is only needed where weights vary.
const STEINER_CLEARANCE_SQRD: f64 = 1.0;

/// Knobs shaping the biased density.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasParams {
    /// Spacing of the Steiner points refining the mesh, in metres.
    pub granularity: f64,
    /// Attraction threshold: geometry closer than this is treated as being
    /// at this distance, in metres.
    pub distance_saturation: f64,
    /// Exponential decay rate of the attraction with squared distance.
    pub attraction_factor: f64,
}

impl Default for BiasParams {
    fn default() -> Self {
        Self {
            granularity: 1.0,
            distance_saturation: 1.0,
            attraction_factor: 1.0,
        }
    }
}

impl BiasParams {
    /// Creates parameters with the given Steiner spacing.
    pub fn new(granularity: f64) -> Self {
        Self {
            granularity,
            ..Default::default()
        }
    }

    /// Sets the distance saturation.
    pub fn with_distance_saturation(mut self, distance_saturation: f64) -> Self {
        self.distance_saturation = distance_saturation;
        self
    }

    /// Sets the attraction factor.
    pub fn with_attraction_factor(mut self, attraction_factor: f64) -> Self {
        self.attraction_factor = attraction_factor;
        self
    }

    /// Validates the parameters, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.granularity.is_finite() || self.granularity <= 0.0 {
            return Err(Error::InvalidConfig("granularity must be > 0".into()));
        }
        if !self.distance_saturation.is_finite() || self.distance_saturation < 0.0 {
            return Err(Error::InvalidConfig(
                "distance_saturation must be >= 0".into(),
            ));
        }
        if !self.attraction_factor.is_finite() || self.attraction_factor < 0.0 {
            return Err(Error::InvalidConfig(
                "attraction_factor must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Weight policy: area scaled by exponential decay over the saturated squared
/// distance from the triangle centroid to the attractive geometry.
struct AreaDistanceWeight<'a> {
    bsp: &'a SolidBsp,
    distance_saturation_sqrd: f64,
    attraction_factor: f64,
}

impl AreaDistanceWeight<'_> {
    fn weight(&self, triangle: &Triangle) -> f64 {
        let area = triangle.area();
        if self.attraction_factor == 0.0 {
            return area;
        }
        let d2 = self
            .bsp
            .min_distance_sqrd_to_solid(triangle.centroid())
            .map_or(f64::INFINITY, |(d2, _)| d2)
            .max(self.distance_saturation_sqrd);
        area * (-self.attraction_factor * d2).exp()
    }
}

/// Generates random points inside a polygonal region with a sampling density
/// biased towards a set of attractive segments.
pub struct BiasedPositionGenerator {
    mesh: WeightedMesh,
}

impl BiasedPositionGenerator {
    /// Builds a generator for `boundary`, biased towards
    /// `attractive_segments`. A plain [`Polygon2`] converts into a boundary
    /// without holes.
    pub fn new(
        boundary: impl Into<PolygonWithHoles2>,
        attractive_segments: &[Segment2],
        params: &BiasParams,
    ) -> Result<Self> {
        let cmp = ToleranceCompare::default();
        let bsp = SolidBsp::new(attractive_segments, SplitStrategy::default(), &cmp);
        Self::with_bsp(boundary, &bsp, params)
    }

    /// Builds a generator reusing an externally owned BSP of the attractive
    /// geometry. The BSP is only borrowed for the duration of construction.
    pub fn with_bsp(
        boundary: impl Into<PolygonWithHoles2>,
        attractive_bsp: &SolidBsp,
        params: &BiasParams,
    ) -> Result<Self> {
        params.validate()?;
        let cmp = ToleranceCompare::default();
        let region = boundary.into();
        validate_region(&region, &cmp)?;
        if attractive_bsp.is_empty() {
            warn!("attractive geometry is empty; weights are plain area at zero attraction and vanish otherwise");
        }

        let steiner =
            generate_fine_steiner_points(&region, params.granularity, attractive_bsp, &cmp)?;
        let (vertices, triangles) = triangulate(&region, &steiner, &cmp)?;
        info!(
            vertices = vertices.len(),
            triangles = triangles.len(),
            steiner = steiner.len(),
            "biased position mesh built"
        );

        let policy = AreaDistanceWeight {
            bsp: attractive_bsp,
            distance_saturation_sqrd: params.distance_saturation * params.distance_saturation,
            attraction_factor: params.attraction_factor,
        };
        let mesh = WeightedMesh::new(vertices, triangles, |t| policy.weight(t))?;
        mesh.adjacency();
        Ok(Self { mesh })
    }

    /// Generates a random position from three uniform values in `[0, 1)`.
    pub fn get_random_position(&self, u0: f64, u1: f64, u2: f64) -> Point2 {
        self.mesh.get_random_position(u0, u1, u2)
    }

    /// Generates a random position, drawing the three uniforms from `rng`.
    pub fn get_random_position_with<R: RngCore + ?Sized>(&self, rng: &mut R) -> Point2 {
        let u0 = rand01(rng);
        let u1 = rand01(rng);
        let u2 = rand01(rng);
        self.mesh.get_random_position(u0, u1, u2)
    }

    /// The weighted mesh backing this generator.
    pub fn mesh(&self) -> &WeightedMesh {
        &self.mesh
    }
}

impl RandomPosition for BiasedPositionGenerator {
    fn random_position(&self, rng: &mut dyn RngCore, _max_attempts: u32) -> Option<Vector2<f64>> {
        Some(self.get_random_position_with(rng).into())
    }
}

fn validate_region(region: &PolygonWithHoles2, cmp: &ToleranceCompare) -> Result<()> {
    if region.outer().is_empty() {
        return Err(Error::InvalidPolygon("empty boundary".into()));
    }
    if !region.outer().is_simple(cmp) {
        return Err(Error::InvalidPolygon("outer ring is not simple".into()));
    }
    for hole in region.holes() {
        if hole.is_empty() || !hole.is_simple(cmp) {
            return Err(Error::InvalidPolygon("hole ring is not simple".into()));
        }
    }
    Ok(())
}

type Cdt = ConstrainedDelaunayTriangulation<SpadePoint<f64>>;

fn insertion_error(e: InsertionError) -> Error {
    Error::Triangulation(format!("{e:?}"))
}

fn insert_ring(cdt: &mut Cdt, ring: &Polygon2) -> Result<()> {
    let mut handles = Vec::with_capacity(ring.len());
    for v in ring.vertices() {
        handles.push(
            cdt.insert(SpadePoint::new(v.x, v.y))
                .map_err(insertion_error)?,
        );
    }
    for i in 0..handles.len() {
        let j = (i + 1) % handles.len();
        if handles[i] != handles[j] {
            cdt.add_constraint(handles[i], handles[j]);
        }
    }
    Ok(())
}

/// Triangulates the region plus Steiner points and keeps the faces whose
/// centroid lies inside the region, dropping hole interiors.
fn triangulate(
    region: &PolygonWithHoles2,
    steiner: &[Point2],
    cmp: &ToleranceCompare,
) -> Result<(Vec<Point2>, Vec<[usize; 3]>)> {
    let mut cdt = Cdt::new();
    insert_ring(&mut cdt, region.outer())?;
    for hole in region.holes() {
        insert_ring(&mut cdt, hole)?;
    }
    for p in steiner {
        cdt.insert(SpadePoint::new(p.x, p.y))
            .map_err(insertion_error)?;
    }

    let vertices: Vec<Point2> = cdt
        .vertices()
        .map(|v| {
            let p = v.position();
            Point2::new(p.x, p.y)
        })
        .collect();

    let mut triangles = Vec::with_capacity(cdt.num_inner_faces());
    for face in cdt.inner_faces() {
        let vs = face.vertices();
        let idx = [
            vs[0].fix().index(),
            vs[1].fix().index(),
            vs[2].fix().index(),
        ];
        let centroid = triangle_centroid(vertices[idx[0]], vertices[idx[1]], vertices[idx[2]]);
        if region.contains(centroid, cmp) {
            triangles.push(idx);
        }
    }
    if triangles.is_empty() {
        return Err(Error::Triangulation(
            "triangulation produced no faces inside the region".into(),
        ));
    }
    Ok((vertices, triangles))
}

/// Enumerates grid cells over each coarse triangle's bounding box and admits
/// cell centroids inside the triangle and clear of the attractive geometry.
/// Centroids are deduplicated by exact coordinate.
fn generate_fine_steiner_points(
    region: &PolygonWithHoles2,
    cell: f64,
    bsp: &SolidBsp,
    cmp: &ToleranceCompare,
) -> Result<Vec<Point2>> {
    let (min, max) = region
        .outer()
        .bounds()
        .ok_or_else(|| Error::InvalidPolygon("empty boundary".into()))?;
    let grid = Grid::from_bounds(min, max, cell);
    let (vertices, triangles) = triangulate(region, &[], cmp)?;

    let mut admitted: BTreeSet<(OrderedFloat<f64>, OrderedFloat<f64>)> = BTreeSet::new();
    for &[i0, i1, i2] in &triangles {
        let (a, b, c) = (vertices[i0], vertices[i1], vertices[i2]);
        let tmin = a.min(b).min(c);
        let tmax = a.max(b).max(c);
        for j in grid.y_index(tmin.y)..=grid.y_index(tmax.y) {
            for i in grid.x_index(tmin.x)..=grid.x_index(tmax.x) {
                let p = grid.cell_centroid(i, j);
                let clear = bsp
                    .min_distance_sqrd_to_solid(p)
                    .map_or(true, |(d2, _)| d2 > STEINER_CLEARANCE_SQRD);
                if clear && point_in_triangle(p, a, b, c, cmp) {
                    admitted.insert((OrderedFloat(p.x), OrderedFloat(p.y)));
                }
            }
        }
    }
    Ok(admitted
        .into_iter()
        .map(|(x, y)| Point2::new(x.into_inner(), y.into_inner()))
        .collect())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn unit_square() -> Polygon2 {
        Polygon2::from_points([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
    }

    fn far_segment() -> Vec<Segment2> {
        vec![Segment2::new(
            Point2::new(200.0, 0.0),
            Point2::new(201.0, 0.0),
        )]
    }

    #[test]
    fn rejects_empty_and_non_simple_boundaries() {
        let params = BiasParams::new(0.1).with_attraction_factor(0.0);
        let empty = Polygon2::default();
        assert!(matches!(
            BiasedPositionGenerator::new(empty, &far_segment(), &params),
            Err(Error::InvalidPolygon(_))
        ));

        let bowtie = Polygon2::from_points([(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0)]);
        assert!(matches!(
            BiasedPositionGenerator::new(bowtie, &far_segment(), &params),
            Err(Error::InvalidPolygon(_))
        ));

        let bad_hole = PolygonWithHoles2::new(
            Polygon2::from_points([(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![Polygon2::from_points([
                (2.0, 2.0),
                (4.0, 4.0),
                (4.0, 2.0),
                (2.0, 4.0),
            ])],
        );
        assert!(matches!(
            BiasedPositionGenerator::new(bad_hole, &far_segment(), &params),
            Err(Error::InvalidPolygon(_))
        ));
    }

    #[test]
    fn rejects_invalid_params() {
        let params = BiasParams::new(0.0);
        assert!(matches!(
            BiasedPositionGenerator::new(unit_square(), &far_segment(), &params),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn mesh_area_matches_the_region() {
        let params = BiasParams::new(0.1).with_attraction_factor(0.0);
        let generator = BiasedPositionGenerator::new(unit_square(), &far_segment(), &params)
            .expect("valid generator");
        assert!((generator.mesh().area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn samples_stay_inside_the_boundary() {
        let params = BiasParams::new(0.1).with_attraction_factor(0.0);
        let generator = BiasedPositionGenerator::new(unit_square(), &far_segment(), &params)
            .expect("valid generator");
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let p = generator.get_random_position_with(&mut rng);
            assert!(
                (-1e-9..=1.0 + 1e-9).contains(&p.x) && (-1e-9..=1.0 + 1e-9).contains(&p.y),
                "{p:?}"
            );
        }
    }

    #[test]
    fn steiner_refinement_kicks_in_away_from_attractors() {
        let coarse: Polygon2 =
            Polygon2::from_points([(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)]);
        let params = BiasParams::new(2.0).with_attraction_factor(0.0);
        let generator = BiasedPositionGenerator::new(coarse, &far_segment(), &params)
            .expect("valid generator");
        // A 20x20 square with 2 m Steiner spacing refines far beyond the two
        // triangles of the raw boundary triangulation.
        assert!(generator.mesh().triangle_count() > 50);
    }

    #[test]
    fn external_bsp_variant_matches_owned_construction() {
        let cmp = ToleranceCompare::default();
        let segments = vec![Segment2::new(Point2::new(0.5, 0.0), Point2::new(0.5, 1.0))];
        let bsp = SolidBsp::new(&segments, SplitStrategy::default(), &cmp);
        let params = BiasParams::new(0.25)
            .with_distance_saturation(0.01)
            .with_attraction_factor(2.0);

        let owned = BiasedPositionGenerator::new(unit_square(), &segments, &params)
            .expect("valid generator");
        let borrowed = BiasedPositionGenerator::with_bsp(unit_square(), &bsp, &params)
            .expect("valid generator");
        assert_eq!(
            owned.mesh().triangle_count(),
            borrowed.mesh().triangle_count()
        );
        assert!((owned.mesh().total_weight() - borrowed.mesh().total_weight()).abs() < 1e-12);
    }

    #[test]
    fn all_zero_weights_fail_deterministically() {
        // The attractive set is so far away that every weight underflows to
        // zero.
        let segments = vec![Segment2::new(
            Point2::new(2000.0, 0.0),
            Point2::new(2000.0, 1.0),
        )];
        let params = BiasParams::new(0.5).with_attraction_factor(1.0);
        assert!(matches!(
            BiasedPositionGenerator::new(unit_square(), &segments, &params),
            Err(Error::ZeroTotalWeight)
        ));
    }

    #[test]
    fn holes_are_excluded_from_the_mesh() {
        let outer = Polygon2::from_points([(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let hole = Polygon2::from_points([(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0)]);
        let region = PolygonWithHoles2::new(outer, vec![hole]);
        let params = BiasParams::new(1.0).with_attraction_factor(0.0);
        let generator = BiasedPositionGenerator::new(region, &far_segment(), &params)
            .expect("valid generator");
        // Net area: 100 minus the 4 m^2 hole.
        assert!((generator.mesh().area() - 96.0).abs() < 1e-6);
    }
}
