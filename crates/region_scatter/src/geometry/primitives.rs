//! Planar primitives and predicates consumed by the samplers.
//!
//! Coordinates are `f64` world units (metres). The samplers only ever use the
//! operations defined here; heavier geometry (triangulation) is delegated to
//! the `spade` crate.
use glam::DVec2;

use crate::geometry::tolerance::ToleranceCompare;

/// A point in the plane, in world units.
pub type Point2 = DVec2;

/// An ordered pair of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment2 {
    pub a: Point2,
    pub b: Point2,
}

impl Segment2 {
    pub fn new(a: Point2, b: Point2) -> Self {
        Self { a, b }
    }

    pub fn delta(&self) -> DVec2 {
        self.b - self.a
    }

    pub fn length_sqrd(&self) -> f64 {
        self.delta().length_squared()
    }

    /// Point at parameter `t` along the segment, `t = 0` at `a`, `t = 1` at `b`.
    pub fn point_at(&self, t: f64) -> Point2 {
        self.a + self.delta() * t
    }

    /// Squared Euclidean distance from `p` to the closest point of the segment.
    pub fn distance_sqrd_to(&self, p: Point2) -> f64 {
        let d = self.delta();
        let len_sqrd = d.length_squared();
        if len_sqrd == 0.0 {
            return p.distance_squared(self.a);
        }
        let t = ((p - self.a).dot(d) / len_sqrd).clamp(0.0, 1.0);
        p.distance_squared(self.a + d * t)
    }

    /// Perpendicular signed distance from `p` to the carrier line, left of
    /// `a -> b` positive. The segment must not be degenerate.
    pub fn signed_side_distance(&self, p: Point2) -> f64 {
        let d = self.delta();
        debug_assert!(d.length_squared() > 0.0, "degenerate segment");
        d.perp_dot(p - self.a) / d.length()
    }

    /// Whether `p` lies on the segment within the tolerance band.
    pub fn contains_point(&self, p: Point2, cmp: &ToleranceCompare) -> bool {
        self.distance_sqrd_to(p) <= cmp.absolute * cmp.absolute
    }
}

/// Whether two segments share a point, with touching counted as intersecting.
pub fn segments_intersect(s: &Segment2, t: &Segment2, cmp: &ToleranceCompare) -> bool {
    let d1 = t.signed_side_distance(s.a);
    let d2 = t.signed_side_distance(s.b);
    let d3 = s.signed_side_distance(t.a);
    let d4 = s.signed_side_distance(t.b);

    let eps = cmp.absolute;
    if ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
    {
        return true;
    }

    (d1.abs() <= eps && t.contains_point(s.a, cmp))
        || (d2.abs() <= eps && t.contains_point(s.b, cmp))
        || (d3.abs() <= eps && s.contains_point(t.a, cmp))
        || (d4.abs() <= eps && s.contains_point(t.b, cmp))
}

/// Twice-signed-area based triangle area, always non-negative.
pub fn triangle_area(a: Point2, b: Point2, c: Point2) -> f64 {
    triangle_signed_area(a, b, c).abs()
}

/// Signed triangle area, positive for counter-clockwise winding.
pub fn triangle_signed_area(a: Point2, b: Point2, c: Point2) -> f64 {
    0.5 * (b - a).perp_dot(c - a)
}

pub fn triangle_centroid(a: Point2, b: Point2, c: Point2) -> Point2 {
    (a + b + c) / 3.0
}

/// Closed point-in-triangle test under tolerance, winding-independent.
pub fn point_in_triangle(
    p: Point2,
    a: Point2,
    b: Point2,
    c: Point2,
    cmp: &ToleranceCompare,
) -> bool {
    let (a, b, c) = if triangle_signed_area(a, b, c) >= 0.0 {
        (a, b, c)
    } else {
        (a, c, b)
    };
    let eps = cmp.absolute;
    Segment2::new(a, b).signed_side_distance(p) >= -eps
        && Segment2::new(b, c).signed_side_distance(p) >= -eps
        && Segment2::new(c, a).signed_side_distance(p) >= -eps
}

/// A vertex ring. Simple (non-self-intersecting) when valid; edges run
/// between consecutive vertices with an implicit closing edge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon2 {
    vertices: Vec<Point2>,
}

impl Polygon2 {
    pub fn new(vertices: Vec<Point2>) -> Self {
        Self { vertices }
    }

    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            vertices: points
                .into_iter()
                .map(|(x, y)| Point2::new(x, y))
                .collect(),
        }
    }

    pub fn vertices(&self) -> &[Point2] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Shoelace area, positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            sum += a.perp_dot(b);
        }
        0.5 * sum
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    pub fn reversed(&self) -> Self {
        let mut vertices = self.vertices.clone();
        vertices.reverse();
        Self { vertices }
    }

    /// Axis-aligned bounds, `None` for an empty ring.
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.vertices[1..] {
            min = min.min(*v);
            max = max.max(*v);
        }
        Some((min, max))
    }

    pub fn edge_segments(&self) -> impl Iterator<Item = Segment2> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment2::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Whether `p` lies on the ring within tolerance.
    pub fn on_boundary(&self, p: Point2, cmp: &ToleranceCompare) -> bool {
        self.edge_segments().any(|e| e.contains_point(p, cmp))
    }

    /// Closed point-in-polygon test; boundary points count as inside.
    pub fn contains(&self, p: Point2, cmp: &ToleranceCompare) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        if self.on_boundary(p, cmp) {
            return true;
        }
        let n = self.vertices.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Non-self-intersection test over all non-adjacent edge pairs.
    ///
    /// Degenerate (zero-length) edges and rings with fewer than three
    /// vertices are not simple.
    pub fn is_simple(&self, cmp: &ToleranceCompare) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let edges: Vec<Segment2> = self.edge_segments().collect();
        if edges
            .iter()
            .any(|e| cmp.is_zero(e.length_sqrd().sqrt()))
        {
            return false;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let adjacent = j == i + 1 || (i == 0 && j == n - 1);
                if adjacent {
                    continue;
                }
                if segments_intersect(&edges[i], &edges[j], cmp) {
                    return false;
                }
            }
        }
        true
    }
}

impl From<Vec<Point2>> for Polygon2 {
    fn from(vertices: Vec<Point2>) -> Self {
        Self::new(vertices)
    }
}

/// An outer ring plus zero or more interior hole rings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonWithHoles2 {
    outer: Polygon2,
    holes: Vec<Polygon2>,
}

impl PolygonWithHoles2 {
    pub fn new(outer: Polygon2, holes: Vec<Polygon2>) -> Self {
        Self { outer, holes }
    }

    pub fn outer(&self) -> &Polygon2 {
        &self.outer
    }

    pub fn holes(&self) -> &[Polygon2] {
        &self.holes
    }

    /// Whether `p` lies in the closure of the region: inside the outer ring
    /// and not strictly interior to any hole.
    pub fn contains(&self, p: Point2, cmp: &ToleranceCompare) -> bool {
        if !self.outer.contains(p, cmp) {
            return false;
        }
        !self
            .holes
            .iter()
            .any(|h| h.contains(p, cmp) && !h.on_boundary(p, cmp))
    }

    /// Boundary edges oriented so the solid side of every segment faces away
    /// from the region interior: outer ring counter-clockwise, holes
    /// clockwise.
    pub fn boundary_segments(&self) -> Vec<Segment2> {
        let mut segments = Vec::new();
        let outer = if self.outer.is_ccw() {
            self.outer.clone()
        } else {
            self.outer.reversed()
        };
        segments.extend(outer.edge_segments());
        for hole in &self.holes {
            let hole = if hole.is_ccw() {
                hole.reversed()
            } else {
                hole.clone()
            };
            segments.extend(hole.edge_segments());
        }
        segments
    }
}

impl From<Polygon2> for PolygonWithHoles2 {
    fn from(outer: Polygon2) -> Self {
        Self {
            outer,
            holes: Vec::new(),
        }
    }
}
