//! Grid-based biased position sampler.
//!
//! A non-mesh alternative to the generator: weighted cell centroids inside
//! the boundary regions, selected by cumulative density, jittered by half a
//! cell and rejected when the jittered point leaves empty space.
use glam::DVec2;
use mint::Vector2;
use rand::RngCore;
use tracing::info;

use crate::bsp::{PointClass, SolidBsp, SplitStrategy};
use crate::error::{Error, Result};
use crate::geometry::{Grid, Point2, PolygonWithHoles2, Segment2, ToleranceCompare};
use crate::sampling::{rand01, RandomPosition};

/// Knobs shaping the grid density.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    /// Cell size of the candidate grid, in metres.
    pub granularity: f64,
    /// Attraction threshold: geometry closer than this is treated as being
    /// at this distance, in metres.
    pub distance_saturation: f64,
    /// Exponential decay rate of the attraction with squared distance.
    pub attraction_factor: f64,
    /// Cell centroids closer than this to the attractive geometry are not
    /// admitted, in metres.
    pub min_distance: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            granularity: 1.0,
            distance_saturation: 1.0,
            attraction_factor: 1.0,
            min_distance: 0.0,
        }
    }
}

impl GridParams {
    /// Creates parameters with the given cell size.
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

    /// Sets the admission distance floor.
    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
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
        if !self.min_distance.is_finite() || self.min_distance < 0.0 {
            return Err(Error::InvalidConfig("min_distance must be >= 0".into()));
        }
        Ok(())
    }
}

/// Weighted grid-cell sampler over one or more boundary regions.
pub struct BiasedPositionGrid {
    half_cell: f64,
    positions: Vec<Point2>,
    integral: Vec<f64>,
    boundary_bsp: SolidBsp,
    cmp: ToleranceCompare,
}

impl BiasedPositionGrid {
    /// Builds the sampler, constructing an internal BSP for
    /// `attractive_segments`.
    pub fn new(
        regions: &[PolygonWithHoles2],
        attractive_segments: &[Segment2],
        params: &GridParams,
    ) -> Result<Self> {
        let cmp = ToleranceCompare::default();
        let bsp = SolidBsp::new(attractive_segments, SplitStrategy::InOrder, &cmp);
        Self::with_bsp(regions, &bsp, params)
    }

    /// Builds the sampler reusing an externally owned BSP of the attractive
    /// geometry.
    pub fn with_bsp(
        regions: &[PolygonWithHoles2],
        attractive_bsp: &SolidBsp,
        params: &GridParams,
    ) -> Result<Self> {
        params.validate()?;
        let cmp = ToleranceCompare::default();

        let boundary_segments: Vec<Segment2> = regions
            .iter()
            .flat_map(PolygonWithHoles2::boundary_segments)
            .collect();
        let boundary_bsp = SolidBsp::new(&boundary_segments, SplitStrategy::InOrder, &cmp);

        let min_distance_sqrd = params.min_distance * params.min_distance;
        let distance_saturation_sqrd =
            params.distance_saturation * params.distance_saturation;

        let mut positions = Vec::new();
        let mut weights = Vec::new();
        for region in regions {
            let Some((min, max)) = region.outer().bounds() else {
                continue;
            };
            let grid = Grid::from_bounds(min, max, params.granularity);
            for j in 0..grid.ny() {
                for i in 0..grid.nx() {
                    let c = grid.cell_centroid(i, j);
                    let d2 = attractive_bsp
                        .min_distance_sqrd_to_solid(c)
                        .map_or(f64::INFINITY, |(d2, _)| d2);
                    if d2 > min_distance_sqrd
                        && boundary_bsp.classify(c, &cmp) == PointClass::InEmpty
                    {
                        positions.push(c);
                        weights.push(if params.attraction_factor == 0.0 {
                            1.0
                        } else {
                            (-params.attraction_factor * d2.max(distance_saturation_sqrd)).exp()
                        });
                    }
                }
            }
        }

        let sum: f64 = weights.iter().sum();
        if !(sum > 0.0) {
            return Err(Error::ZeroTotalWeight);
        }
        let mut integral = Vec::with_capacity(weights.len());
        let mut acc = 0.0;
        for w in &weights {
            acc += w / sum;
            integral.push(acc);
        }
        if let Some(last) = integral.last_mut() {
            *last = 1.0;
        }
        info!(positions = positions.len(), "biased position grid built");

        Ok(Self {
            half_cell: 0.5 * params.granularity,
            positions,
            integral,
            boundary_bsp,
            cmp,
        })
    }

    /// Admitted cell centroids.
    pub fn positions(&self) -> &[Point2] {
        &self.positions
    }

    /// Normalised cumulative density over [`positions`](Self::positions);
    /// the last entry is exactly 1.0.
    pub fn integral(&self) -> &[f64] {
        &self.integral
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Draws a random position, retrying the jitter up to `max_attempts`
    /// times; `None` when every attempt landed in solid space.
    pub fn get_random_position<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        max_attempts: u32,
    ) -> Option<Point2> {
        for _ in 0..max_attempts {
            let u = rand01(rng);
            let i = self
                .integral
                .partition_point(|&c| c < u)
                .min(self.positions.len() - 1);
            let p = self.jittered(i, rng);
            if self.boundary_bsp.classify(p, &self.cmp) == PointClass::InEmpty {
                return Some(p);
            }
        }
        None
    }

    /// Uniform jitter of position `i` by up to half a cell per axis.
    fn jittered<R: RngCore + ?Sized>(&self, i: usize, rng: &mut R) -> Point2 {
        let ux = rand01(rng) * 2.0 - 1.0;
        let uy = rand01(rng) * 2.0 - 1.0;
        self.positions[i] + DVec2::new(ux * self.half_cell, uy * self.half_cell)
    }
}

impl RandomPosition for BiasedPositionGrid {
    fn random_position(&self, rng: &mut dyn RngCore, max_attempts: u32) -> Option<Vector2<f64>> {
        self.get_random_position(rng, max_attempts).map(Into::into)
    }
}
