//! Bounds-anchored uniform cell grid.
//!
//! Used by the samplers to enumerate candidate cell centroids over a region's
//! bounding box. Indices are clamped to the grid extent so querying with the
//! exact upper bound stays in range.
use crate::geometry::primitives::Point2;

/// A uniform grid of square cells anchored at the lower-left corner of a
/// bounding box.
#[derive(Debug, Clone)]
pub struct Grid {
    origin: Point2,
    cell: f64,
    nx: usize,
    ny: usize,
}

impl Grid {
    /// Creates a grid covering `[min, max]` with the given cell size.
    ///
    /// The extent is rounded up to whole cells; `cell` must be positive and
    /// finite.
    pub fn from_bounds(min: Point2, max: Point2, cell: f64) -> Self {
        debug_assert!(cell.is_finite() && cell > 0.0, "cell size must be > 0");
        let extent = (max - min).max(Point2::ZERO);
        let nx = ((extent.x / cell).ceil() as usize).max(1);
        let ny = ((extent.y / cell).ceil() as usize).max(1);
        Self {
            origin: min,
            cell,
            nx,
            ny,
        }
    }

    /// Number of cells along the x axis.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of cells along the y axis.
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Cell size in world units.
    pub fn cell_size(&self) -> f64 {
        self.cell
    }

    /// Column index of `x`, clamped to the grid extent.
    pub fn x_index(&self, x: f64) -> usize {
        let i = ((x - self.origin.x) / self.cell).floor();
        (i.max(0.0) as usize).min(self.nx - 1)
    }

    /// Row index of `y`, clamped to the grid extent.
    pub fn y_index(&self, y: f64) -> usize {
        let j = ((y - self.origin.y) / self.cell).floor();
        (j.max(0.0) as usize).min(self.ny - 1)
    }

    /// Centroid of cell `(i, j)`.
    pub fn cell_centroid(&self, i: usize, j: usize) -> Point2 {
        debug_assert!(i < self.nx && j < self.ny, "cell index out of range");
        Point2::new(
            self.origin.x + (i as f64 + 0.5) * self.cell,
            self.origin.y + (j as f64 + 0.5) * self.cell,
        )
    }
}
