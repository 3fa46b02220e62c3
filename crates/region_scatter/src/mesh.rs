//! Triangle mesh annotated with per-triangle weights and cumulative area.
//!
//! The mesh is immutable after construction; the adjacency relation is
//! computed lazily on first request and cached behind a one-shot initializer,
//! so concurrent readers all observe the same value.
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::geometry::{triangle_area, triangle_centroid, Point2};

/// Three vertices of a mesh triangle, in vertex order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Point2; 3],
}

impl Triangle {
    pub fn new(a: Point2, b: Point2, c: Point2) -> Self {
        Self { vertices: [a, b, c] }
    }

    pub fn area(&self) -> f64 {
        let [a, b, c] = self.vertices;
        triangle_area(a, b, c)
    }

    pub fn centroid(&self) -> Point2 {
        let [a, b, c] = self.vertices;
        triangle_centroid(a, b, c)
    }
}

/// Per-triangle adjacency: for each triangle, the neighbor sharing edge
/// `(v0,v1)`, `(v1,v2)` and `(v2,v0)` respectively, if any.
pub type AdjacencyMatrix = Vec<[Option<usize>; 3]>;

/// A weighted triangle mesh supporting O(log n) weighted position sampling.
pub struct WeightedMesh {
    vertices: Vec<Point2>,
    triangles: Vec<[usize; 3]>,
    weights: Vec<f64>,
    cumulative: Vec<f64>,
    adjacency: OnceLock<AdjacencyMatrix>,
}

impl WeightedMesh {
    /// Builds the mesh and evaluates `weight_fn` once per triangle.
    ///
    /// Fails with [`Error::ZeroTotalWeight`] when the triangle list is empty
    /// or every effective weight is zero; weights must be finite and
    /// non-negative.
    pub fn new(
        vertices: Vec<Point2>,
        triangles: Vec<[usize; 3]>,
        weight_fn: impl Fn(&Triangle) -> f64,
    ) -> Result<Self> {
        if triangles.is_empty() {
            return Err(Error::ZeroTotalWeight);
        }
        let mut weights = Vec::with_capacity(triangles.len());
        let mut cumulative = Vec::with_capacity(triangles.len());
        let mut total = 0.0;
        for &[i0, i1, i2] in &triangles {
            let max = vertices.len();
            if i0 >= max || i1 >= max || i2 >= max {
                return Err(Error::Other(format!(
                    "triangle index out of range: [{i0}, {i1}, {i2}] with {max} vertices"
                )));
            }
            let triangle = Triangle::new(vertices[i0], vertices[i1], vertices[i2]);
            let w = weight_fn(&triangle);
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Other(format!(
                    "triangle weight must be finite and non-negative, got {w}"
                )));
            }
            total += w;
            weights.push(w);
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Err(Error::ZeroTotalWeight);
        }
        Ok(Self {
            vertices,
            triangles,
            weights,
            cumulative,
            adjacency: OnceLock::new(),
        })
    }

    pub fn vertices(&self) -> &[Point2] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, i: usize) -> Triangle {
        let [i0, i1, i2] = self.triangles[i];
        Triangle::new(self.vertices[i0], self.vertices[i1], self.vertices[i2])
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Monotone cumulative weights; the last entry is the total weight.
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn total_weight(&self) -> f64 {
        *self.cumulative.last().expect("mesh is never empty")
    }

    /// Sum of the triangle areas.
    pub fn area(&self) -> f64 {
        (0..self.triangles.len()).map(|i| self.triangle(i).area()).sum()
    }

    /// Selects a triangle by cumulative weight from `u0` and a point inside
    /// it by barycentric folding of `u1`, `u2`.
    ///
    /// All three inputs must lie in `[0, 1)`; out-of-range values are a
    /// caller bug.
    pub fn get_random_position(&self, u0: f64, u1: f64, u2: f64) -> Point2 {
        debug_assert!((0.0..1.0).contains(&u0), "u0 out of [0, 1)");
        debug_assert!((0.0..1.0).contains(&u1), "u1 out of [0, 1)");
        debug_assert!((0.0..1.0).contains(&u2), "u2 out of [0, 1)");

        let target = u0 * self.total_weight();
        let i = self
            .cumulative
            .partition_point(|&c| c < target)
            .min(self.triangles.len() - 1);

        let (a, b) = if u1 + u2 > 1.0 {
            (1.0 - u1, 1.0 - u2)
        } else {
            (u1, u2)
        };
        let c = 1.0 - a - b;

        let [i0, i1, i2] = self.triangles[i];
        self.vertices[i0] * a + self.vertices[i1] * b + self.vertices[i2] * c
    }

    /// Triangle adjacency based on shared edges, computed on first call and
    /// cached. The first caller wins; later callers observe the cached value.
    pub fn adjacency(&self) -> &AdjacencyMatrix {
        self.adjacency.get_or_init(|| self.build_adjacency())
    }

    fn build_adjacency(&self) -> AdjacencyMatrix {
        let mut matrix: AdjacencyMatrix = vec![[None; 3]; self.triangles.len()];
        let mut edges: HashMap<(usize, usize), (usize, usize)> =
            HashMap::with_capacity(self.triangles.len() * 3 / 2);
        for (t, &[i0, i1, i2]) in self.triangles.iter().enumerate() {
            for (slot, (a, b)) in [(i0, i1), (i1, i2), (i2, i0)].into_iter().enumerate() {
                let key = (a.min(b), a.max(b));
                match edges.remove(&key) {
                    Some((other, other_slot)) => {
                        matrix[t][slot] = Some(other);
                        matrix[other][other_slot] = Some(t);
                    }
                    None => {
                        edges.insert(key, (t, slot));
                    }
                }
            }
        }
        matrix
    }
}
