//! Trait definitions.

use crate::types::BridgeResult;
use rlst::RlstScalar;

/// Evaluation of a Green's function kernel and its target derivatives.
///
/// Coordinate slices are point-major: the coordinates of each point are
/// stored contiguously. For every (target, source) pair the evaluator
/// writes `1 + dim` entries into the result slice, the kernel value
/// followed by the components of the target gradient, with the source
/// index running faster than the target index.
pub trait KernelEvaluator: Sync {
    /// Scalar type of kernel values.
    type T: RlstScalar;

    /// Dimension of the ambient space the kernel lives in.
    fn space_dimension(&self) -> usize;

    /// Number of entries written per point pair.
    fn deriv_size(&self) -> usize {
        self.space_dimension() + 1
    }

    /// Tabulate values and target gradients for all point pairs.
    fn assemble_st(
        &self,
        sources: &[<Self::T as RlstScalar>::Real],
        targets: &[<Self::T as RlstScalar>::Real],
        result: &mut [Self::T],
    );

    /// Target gradient of the normal derivative taken at the source.
    ///
    /// Writes the `dim` components of `grad_x (d G(x, y) / d n_y)` for a
    /// single pair, with `normal` the unit normal at the source point.
    fn normal_target_gradient(
        &self,
        source: &[<Self::T as RlstScalar>::Real],
        normal: &[<Self::T as RlstScalar>::Real],
        target: &[<Self::T as RlstScalar>::Real],
        result: &mut [Self::T],
    );
}

/// A linear operator given by its action on a vector.
///
/// Implemented by sparse matrices and by the matrix-free coupling
/// operator so that iterative solvers can consume either.
pub trait LinearOperator {
    /// Scalar type the operator acts on.
    type T: RlstScalar;

    /// Dimension of the (square) operator.
    fn dim(&self) -> usize;

    /// Compute `y = A x`.
    fn apply(&self, x: &[Self::T], y: &mut [Self::T]) -> BridgeResult<()>;
}
