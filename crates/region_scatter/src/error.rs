//! Error types and result alias for the crate.
//!
//! This module defines [`enum@crate::error::Error`] and the crate-wide [Result] alias. Variants cover
//! invalid boundary geometry, meshes and grids without sampleable content,
//! invalid pool configuration, triangulator failures, IO, and generic errors.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("total sampling weight is zero; no sampleable content")]
    ZeroTotalWeight,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("triangulation error: {0}")]
    Triangulation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Other(value.to_owned())
    }
}
