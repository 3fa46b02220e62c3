//! Planar primitives, tolerance comparisons, and grid helpers.
//!
//! This module holds the small geometric vocabulary the samplers consume:
//! points, segments, polygon rings with holes, a handful of predicates, and a
//! bounds-anchored cell grid.
pub mod grid;
pub mod primitives;
pub mod tolerance;

pub use grid::Grid;
pub use primitives::{
    point_in_triangle, segments_intersect, triangle_area, triangle_centroid,
    triangle_signed_area, Point2, Polygon2, PolygonWithHoles2, Segment2,
};
pub use tolerance::ToleranceCompare;
