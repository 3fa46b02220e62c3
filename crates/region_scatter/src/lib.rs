#![forbid(unsafe_code)]
//! region_scatter: biased random position sampling inside polygonal regions,
//! plus a cooperative fiber pool for parallel workloads.
//!
//! Modules:
//! - geometry: planar primitives, tolerance comparisons, cell grids
//! - bsp: solid binary space partition with distance queries
//! - mesh: weighted triangle mesh with O(log n) weighted selection
//! - sampling: mesh- and grid-based biased position samplers
//! - thread: task queue, fiber pool, thread-specific storage
//!
//! For examples and docs, see README and docs.rs.
pub mod bsp;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod sampling;
pub mod thread;

/// Convenient re-exports for common types. Import with `use region_scatter::prelude::*;`.
pub mod prelude {
    pub use crate::bsp::{PointClass, SolidBsp, SplitStrategy};
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{
        Grid, Point2, Polygon2, PolygonWithHoles2, Segment2, ToleranceCompare,
    };
    pub use crate::mesh::{AdjacencyMatrix, Triangle, WeightedMesh};
    pub use crate::sampling::{
        BiasParams, BiasedPositionGenerator, BiasedPositionGrid, GridParams, RandomPosition,
    };
    pub use crate::thread::{
        FiberPool, FiberPoolConfig, PoolState, TaskError, TaskFuture, TaskQueue, ThreadSpecific,
    };
}
