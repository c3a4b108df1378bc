//! Resampling matrices that reverse element orientation.
//!
//! Flipping a simplex element swaps its first two vertices, which in
//! barycentric coordinates swaps the first two coordinates of every
//! node. The resampling matrix maps nodal values on the original unit
//! nodes to nodal values on the flipped unit nodes; for a nodal basis it
//! is a signed permutation-like matrix that squares to the identity.

use crate::bimesh::SimplexElementGroup;
use crate::types::{BridgeError, BridgeResult, RealScalar};
use rlst::{
    rlst_dynamic_array2, DynamicArray, MatrixInverse, RandomAccessByRef, RandomAccessMut,
    RlstScalar,
};

const ZERO_CUTOFF: f64 = 1e-15;
const INVOLUTION_TOL: f64 = 1e-13;

/// Number of monomials up to the given order on a simplex.
fn basis_size(dim: usize, order: usize) -> usize {
    match dim {
        1 => order + 1,
        _ => (order + 1) * (order + 2) / 2,
    }
}

/// Evaluate monomial `index` at a reference point.
fn monomial<R: RealScalar>(dim: usize, index: usize, point: &[R]) -> R {
    match dim {
        1 => {
            // 1, x, x^2, ...
            let mut value = R::one();
            for _ in 0..index {
                value = value * point[0];
            }
            value
        }
        _ => {
            // 1, x, y, x^2, xy, y^2, ... ordered by total degree
            let mut degree = 0;
            let mut offset = 0;
            while offset + degree + 1 <= index {
                offset += degree + 1;
                degree += 1;
            }
            let ypow = index - offset;
            let xpow = degree - ypow;
            let mut value = R::one();
            for _ in 0..xpow {
                value = value * point[0];
            }
            for _ in 0..ypow {
                value = value * point[1];
            }
            value
        }
    }
}

/// Swap the first two barycentric coordinates of a reference point.
fn flip_reference_point<R: RealScalar>(dim: usize, point: &[R]) -> Vec<R> {
    match dim {
        1 => vec![R::one() - point[0]],
        _ => vec![R::one() - point[0] - point[1], point[1]],
    }
}

/// Resampling matrix from nodal values on `unit_nodes` to nodal values
/// on the flipped unit nodes.
///
/// The nodes must be unisolvent for the polynomial space of the given
/// order. Entries below `1e-15` are zeroed and the result is checked to
/// square to the identity to `1e-13`.
pub fn flip_matrix<T: RlstScalar + MatrixInverse>(
    unit_nodes: &[T::Real],
    dim: usize,
    order: usize,
) -> BridgeResult<DynamicArray<T, 2>>
where
    T::Real: RealScalar,
{
    if dim != 1 && dim != 2 {
        return Err(BridgeError::Validation(format!(
            "Flip matrices are only defined for dimension 1 and 2, got {dim}"
        )));
    }
    let n = unit_nodes.len() / dim;
    if basis_size(dim, order) != n {
        return Err(BridgeError::Validation(format!(
            "{n} nodes cannot be unisolvent for order {order} in dimension {dim}"
        )));
    }

    // Vandermonde matrix on the original nodes, inverted in place
    let mut inverse = rlst_dynamic_array2!(T, [n, n]);
    for i in 0..n {
        let point = &unit_nodes[i * dim..(i + 1) * dim];
        for j in 0..n {
            *inverse.get_mut([i, j]).unwrap() = T::from_real(monomial(dim, j, point));
        }
    }
    inverse
        .view_mut()
        .into_inverse_alloc()
        .map_err(|_| BridgeError::Degenerate("Unit nodes are not unisolvent".to_string()))?;

    let mut matrix = rlst_dynamic_array2!(T, [n, n]);
    let cutoff = num::cast::<f64, T::Real>(ZERO_CUTOFF).unwrap();
    for i in 0..n {
        let flipped = flip_reference_point(dim, &unit_nodes[i * dim..(i + 1) * dim]);
        for j in 0..n {
            let mut entry = T::zero();
            for l in 0..n {
                entry += T::from_real(monomial(dim, l, &flipped)) * *inverse.get([l, j]).unwrap();
            }
            if entry.abs() < cutoff {
                entry = T::zero();
            }
            *matrix.get_mut([i, j]).unwrap() = entry;
        }
    }

    // A flip applied twice must be the identity
    let tol = num::cast::<f64, T::Real>(INVOLUTION_TOL).unwrap();
    for i in 0..n {
        for j in 0..n {
            let mut entry = T::zero();
            for l in 0..n {
                entry += *matrix.get([i, l]).unwrap() * *matrix.get([l, j]).unwrap();
            }
            let expected = if i == j { T::one() } else { T::zero() };
            if (entry - expected).abs() > tol {
                return Err(BridgeError::Degenerate(
                    "Flip matrix is not an involution".to_string(),
                ));
            }
        }
    }
    Ok(matrix)
}

/// Flip every element with negative orientation in place.
///
/// Swaps the first two vertices of each flagged element and resamples
/// its node coordinates with the flip matrix. Returns the number of
/// flipped elements.
pub fn flip_simplex_element_group<R: RealScalar + MatrixInverse>(
    group: &mut SimplexElementGroup<R>,
    orientation: &[R],
) -> BridgeResult<usize> {
    if orientation.len() != group.nelements() {
        return Err(BridgeError::Shape {
            expected: group.nelements(),
            actual: orientation.len(),
        });
    }
    let matrix = flip_matrix::<R>(group.unit_nodes(), group.dim(), group.order())?;
    let nunit = group.nunit_nodes();
    let mut nflipped = 0;
    let mut resampled = vec![R::zero(); nunit];
    for e in 0..group.nelements() {
        if orientation[e] >= R::zero() {
            continue;
        }
        nflipped += 1;
        group.swap_element_vertices(e, 0, 1);
        for axis in 0..group.ambient_dim() {
            {
                let old = group.element_nodes(axis, e);
                for (i, r) in resampled.iter_mut().enumerate() {
                    let mut value = R::zero();
                    for j in 0..nunit {
                        value = value + *matrix.get([i, j]).unwrap() * old[j];
                    }
                    *r = value;
                }
            }
            group.set_element_nodes(axis, e, &resampled);
        }
    }
    Ok(nflipped)
}
