//! Common types and the crate error taxonomy.

use rlst::{LinAlg, RlstScalar};
use thiserror::Error;

/// Scalar types usable as geometry coordinates.
pub trait RealScalar: num::Float + LinAlg + RlstScalar<Real = Self> {}

impl<T: num::Float + LinAlg + RlstScalar<Real = T>> RealScalar for T {}

/// Direction of a data reordering between the finite element and
/// boundary integral node orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Finite element ordering to boundary integral ordering.
    Forward,
    /// Boundary integral ordering to finite element ordering.
    Inverse,
}

/// Errors raised while converting meshes, binding operators or applying
/// bridged data transfers.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// An input failed an upfront structural check.
    #[error("Validation failure: {0}")]
    Validation(String),
    /// A symbolic expression could not be resolved against its bindings.
    #[error("Binding failure: {0}")]
    Binding(String),
    /// An array had the wrong length for the requested operation.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape {
        /// Length the operation required.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// Geometry turned out degenerate during a numerical check.
    #[error("Degenerate geometry: {0}")]
    Degenerate(String),
}

/// Result alias used across the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;
