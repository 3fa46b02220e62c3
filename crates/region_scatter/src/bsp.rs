//! Solid binary space partition over a planar segment set.
//!
//! The tree recursively splits the plane along segment carrier lines. Each
//! node keeps the segments coplanar with its hyperplane; straddling segments
//! are split at the crossing and both halves keep the index of the input
//! segment they came from. The left side of a segment (`a -> b`) is the empty
//! side, the right side solid, so region boundaries built from
//! [`PolygonWithHoles2::boundary_segments`](crate::geometry::PolygonWithHoles2::boundary_segments)
//! classify the region interior as empty space.
//!
//! Built once, immutable afterwards; concurrent readers need no locking.
use tracing::debug;

use crate::geometry::{Point2, Segment2, ToleranceCompare};

/// Classification of a point against the solid partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointClass {
    InSolid,
    InEmpty,
    OnBoundary,
}

/// Splitter selection policy used while building the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitStrategy {
    /// Always split along the first remaining segment, in input order.
    InOrder,
    /// Score every candidate and pick the cheapest: score =
    /// `balance_weight * |front - back| + straddle_weight * straddles`.
    /// Ties are broken by input order.
    Scored {
        balance_weight: f64,
        straddle_weight: f64,
    },
}

impl Default for SplitStrategy {
    fn default() -> Self {
        Self::Scored {
            balance_weight: 1.0,
            straddle_weight: 8.0,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedSegment {
    seg: Segment2,
    index: usize,
}

enum SegmentSide {
    Coplanar,
    Front,
    Back,
    Straddle,
}

fn segment_side(plane: &Segment2, seg: &Segment2, eps: f64) -> SegmentSide {
    let da = plane.signed_side_distance(seg.a);
    let db = plane.signed_side_distance(seg.b);
    if da.abs() <= eps && db.abs() <= eps {
        SegmentSide::Coplanar
    } else if da >= -eps && db >= -eps {
        SegmentSide::Front
    } else if da <= eps && db <= eps {
        SegmentSide::Back
    } else {
        SegmentSide::Straddle
    }
}

struct Node {
    plane: Segment2,
    coplanar: Vec<IndexedSegment>,
    front: Option<Box<Node>>,
    back: Option<Box<Node>>,
}

impl Node {
    fn classify(&self, p: Point2, cmp: &ToleranceCompare) -> PointClass {
        let d = self.plane.signed_side_distance(p);
        if d > cmp.absolute {
            match &self.front {
                Some(n) => n.classify(p, cmp),
                None => PointClass::InEmpty,
            }
        } else if d < -cmp.absolute {
            match &self.back {
                Some(n) => n.classify(p, cmp),
                None => PointClass::InSolid,
            }
        } else {
            // On the hyperplane: resolve against the node's own segments
            // first, otherwise both subtrees must agree.
            if self.coplanar.iter().any(|s| s.seg.contains_point(p, cmp)) {
                return PointClass::OnBoundary;
            }
            let front = match &self.front {
                Some(n) => n.classify(p, cmp),
                None => PointClass::InEmpty,
            };
            let back = match &self.back {
                Some(n) => n.classify(p, cmp),
                None => PointClass::InSolid,
            };
            if front == back {
                front
            } else {
                PointClass::OnBoundary
            }
        }
    }

    fn min_distance(&self, p: Point2, best: &mut (f64, usize)) {
        for s in &self.coplanar {
            let d2 = s.seg.distance_sqrd_to(p);
            if d2 < best.0 || (d2 == best.0 && s.index < best.1) {
                *best = (d2, s.index);
            }
        }
        let d = self.plane.signed_side_distance(p);
        let (near, far) = if d >= 0.0 {
            (&self.front, &self.back)
        } else {
            (&self.back, &self.front)
        };
        if let Some(n) = near {
            n.min_distance(p, best);
        }
        if d * d <= best.0 {
            if let Some(n) = far {
                n.min_distance(p, best);
            }
        }
    }
}

/// Binary partition of a segment set supporting point-in-solid and
/// nearest-distance queries.
pub struct SolidBsp {
    root: Option<Box<Node>>,
    segment_count: usize,
}

impl SolidBsp {
    /// Builds the tree from `segments`. Degenerate (zero-length) segments are
    /// skipped; they define no hyperplane.
    pub fn new(segments: &[Segment2], strategy: SplitStrategy, cmp: &ToleranceCompare) -> Self {
        let indexed: Vec<IndexedSegment> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.length_sqrd() > 0.0)
            .map(|(index, seg)| IndexedSegment { seg: *seg, index })
            .collect();
        let root = build(indexed, strategy, cmp.absolute);
        debug!(segments = segments.len(), "solid BSP built");
        Self {
            root,
            segment_count: segments.len(),
        }
    }

    /// Number of input segments the tree was built from.
    pub fn len(&self) -> usize {
        self.segment_count
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Classifies `p` against the partition. An empty tree classifies the
    /// whole plane as empty space.
    pub fn classify(&self, p: Point2, cmp: &ToleranceCompare) -> PointClass {
        match &self.root {
            Some(n) => n.classify(p, cmp),
            None => PointClass::InEmpty,
        }
    }

    /// Minimum squared distance from `p` to any input segment, together with
    /// the input index of the nearest segment (lowest index on ties).
    /// `None` when the tree holds no segments.
    pub fn min_distance_sqrd_to_solid(&self, p: Point2) -> Option<(f64, usize)> {
        let root = self.root.as_ref()?;
        let mut best = (f64::INFINITY, usize::MAX);
        root.min_distance(p, &mut best);
        Some(best)
    }
}

fn build(
    mut segments: Vec<IndexedSegment>,
    strategy: SplitStrategy,
    eps: f64,
) -> Option<Box<Node>> {
    if segments.is_empty() {
        return None;
    }
    let pick = choose_splitter(&segments, strategy, eps);
    let splitter = segments.remove(pick);
    let plane = splitter.seg;

    let mut coplanar = vec![splitter];
    let mut front = Vec::new();
    let mut back = Vec::new();

    for s in segments {
        match segment_side(&plane, &s.seg, eps) {
            SegmentSide::Coplanar => coplanar.push(s),
            SegmentSide::Front => front.push(s),
            SegmentSide::Back => back.push(s),
            SegmentSide::Straddle => {
                let da = plane.signed_side_distance(s.seg.a);
                let db = plane.signed_side_distance(s.seg.b);
                let t = da / (da - db);
                let x = s.seg.point_at(t);
                let first = IndexedSegment {
                    seg: Segment2::new(s.seg.a, x),
                    index: s.index,
                };
                let second = IndexedSegment {
                    seg: Segment2::new(x, s.seg.b),
                    index: s.index,
                };
                if da > 0.0 {
                    front.push(first);
                    back.push(second);
                } else {
                    back.push(first);
                    front.push(second);
                }
            }
        }
    }

    Some(Box::new(Node {
        plane,
        coplanar,
        front: build(front, strategy, eps),
        back: build(back, strategy, eps),
    }))
}

fn choose_splitter(segments: &[IndexedSegment], strategy: SplitStrategy, eps: f64) -> usize {
    let (balance_weight, straddle_weight) = match strategy {
        SplitStrategy::InOrder => return 0,
        SplitStrategy::Scored {
            balance_weight,
            straddle_weight,
        } => (balance_weight, straddle_weight),
    };

    let mut best = 0;
    let mut best_score = f64::INFINITY;
    for (i, candidate) in segments.iter().enumerate() {
        let mut front = 0i64;
        let mut back = 0i64;
        let mut straddles = 0i64;
        for (j, other) in segments.iter().enumerate() {
            if i == j {
                continue;
            }
            match segment_side(&candidate.seg, &other.seg, eps) {
                SegmentSide::Front => front += 1,
                SegmentSide::Back => back += 1,
                SegmentSide::Straddle => straddles += 1,
                SegmentSide::Coplanar => {}
            }
        }
        let score =
            balance_weight * (front - back).abs() as f64 + straddle_weight * straddles as f64;
        if score < best_score {
            best_score = score;
            best = i;
        }
    }
    best
}
