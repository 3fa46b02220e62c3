//! Biased position sampling strategies over polygonal regions.
//!
//! Two strategies are provided: a mesh-based generator that triangulates the
//! region and samples by cumulative triangle weight, and a grid-based sampler
//! that jitters weighted cell centroids with rejection on solid space.
use mint::Vector2;
use rand::RngCore;

pub mod biased_generator;
pub mod biased_grid;

pub use biased_generator::{BiasParams, BiasedPositionGenerator};
pub use biased_grid::{BiasedPositionGrid, GridParams};

/// Trait for drawing biased random positions from a prepared sampler.
pub trait RandomPosition: Send + Sync {
    /// Draws one position. Strategies that reject internally retry up to
    /// `max_attempts` times and return `None` on exhaustion; strategies
    /// without rejection always return `Some`.
    fn random_position(&self, rng: &mut dyn RngCore, max_attempts: u32) -> Option<Vector2<f64>>;
}

/// Generate a random float in the range [0, 1).
#[inline]
pub(crate) fn rand01<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    ((rng.next_u64() >> 11) as f64) * (1.0 / (1u64 << 53) as f64)
}
