//! Finite element assembly on triangle meshes.
//!
//! Provides the sparse Helmholtz system and the boundary functionals the
//! matrix-free coupling operator needs, along with L2 norms for error
//! measurement. All forms are assembled with exact rules for piecewise
//! linears.

use crate::function::{Continuity, Function, FunctionSpace};
use crate::grid::TriangleMesh;
use crate::quadrature::triangle_rule;
use crate::sparse::{CsrMatrix, SparseMatrixData};
use crate::types::{BridgeError, BridgeResult, RealScalar};
use num::{One, Zero};
use rlst::RlstScalar;

fn require_cg1<T: RlstScalar>(space: &FunctionSpace<T>) -> BridgeResult<()>
where
    T::Real: RealScalar,
{
    if space.continuity() != Continuity::Standard || space.degree() != 1 || space.value_size() != 1
    {
        return Err(BridgeError::Validation(
            "Assembly requires a scalar continuous degree 1 space".to_string(),
        ));
    }
    if space.mesh().gdim() != 2 {
        return Err(BridgeError::Validation(
            "Assembly is only supported on planar meshes".to_string(),
        ));
    }
    Ok(())
}

fn require_same_mesh<T: RlstScalar>(
    a: &TriangleMesh<T::Real>,
    b: &TriangleMesh<T::Real>,
) -> BridgeResult<()>
where
    T::Real: RealScalar,
{
    if !std::ptr::eq(a, b) {
        return Err(BridgeError::Validation(
            "Spaces must share the same mesh".to_string(),
        ));
    }
    Ok(())
}

/// Edge shape function coefficients of a P1 triangle: for each vertex i
/// the gradient of its hat function is `(b_i, c_i) / (2 area)`.
fn p1_gradient_coefficients<R: RealScalar>(p: &[[R; 2]; 3]) -> ([R; 3], [R; 3], R) {
    let mut b = [R::zero(); 3];
    let mut c = [R::zero(); 3];
    for i in 0..3 {
        let j = (i + 1) % 3;
        let k = (i + 2) % 3;
        b[i] = p[j][1] - p[k][1];
        c[i] = p[k][0] - p[j][0];
    }
    let two_area = (p[1][0] - p[0][0]) * (p[2][1] - p[0][1])
        - (p[1][1] - p[0][1]) * (p[2][0] - p[0][0]);
    (b, c, two_area)
}

/// Assemble `K - k^2 M - i k B` on a continuous degree 1 space, where K
/// is the stiffness matrix, M the mass matrix and B the boundary mass
/// matrix over the facets carrying `outer_marker`.
pub fn assemble_helmholtz<T: RlstScalar<Complex = T>>(
    space: &FunctionSpace<T>,
    wavenumber: T::Real,
    outer_marker: i32,
) -> BridgeResult<CsrMatrix<T>>
where
    T::Real: RealScalar,
{
    require_cg1(space)?;
    let mesh = space.mesh();
    let n = space.local_size();
    let mut data = SparseMatrixData::<T>::new([n, n], 9 * mesh.cell_count());
    let twelve = num::cast::<f64, T::Real>(12.0).unwrap();
    let two = num::cast::<f64, T::Real>(2.0).unwrap();
    for cell in 0..mesh.cell_count() {
        let dofs = space.cell_dofs(cell);
        let vertices = mesh.cell(cell);
        let p = [
            [mesh.vertex(vertices[0])[0], mesh.vertex(vertices[0])[1]],
            [mesh.vertex(vertices[1])[0], mesh.vertex(vertices[1])[1]],
            [mesh.vertex(vertices[2])[0], mesh.vertex(vertices[2])[1]],
        ];
        let (b, c, two_area) = p1_gradient_coefficients(&p);
        if two_area.abs() < <T::Real as num::Float>::epsilon() {
            return Err(BridgeError::Degenerate(format!(
                "Cell {cell} has zero area"
            )));
        }
        let area = two_area.abs() / two;
        for i in 0..3 {
            for j in 0..3 {
                let stiffness = (b[i] * b[j] + c[i] * c[j]) / (two * two * area);
                let mass = if i == j {
                    area / (twelve / two)
                } else {
                    area / twelve
                };
                let value =
                    T::from_real(stiffness) - T::from_real(wavenumber * wavenumber * mass);
                data.push(dofs[i], dofs[j], value);
            }
        }
    }
    // Sommerfeld-type boundary term on the outer boundary
    let six = num::cast::<f64, T::Real>(6.0).unwrap();
    for facet in mesh.exterior_facets() {
        if facet.marker != outer_marker {
            continue;
        }
        let length = mesh.facet_length(facet.cell, facet.local_facet);
        let [a, bvert] = mesh.facet_vertices(facet.cell, facet.local_facet);
        let local = crate::grid::FACET_VERTICES[facet.local_facet];
        let dofs = space.cell_dofs(facet.cell);
        let edge_dofs = [dofs[local[0]], dofs[local[1]]];
        debug_assert_eq!(mesh.cell(facet.cell)[local[0]], a);
        debug_assert_eq!(mesh.cell(facet.cell)[local[1]], bvert);
        for i in 0..2 {
            for j in 0..2 {
                let mass = if i == j {
                    length / (six / two)
                } else {
                    length / six
                };
                data.push(
                    edge_dofs[i],
                    edge_dofs[j],
                    T::complex(T::Real::zero(), -(wavenumber * mass)),
                );
            }
        }
    }
    data.into_csr()
}

/// Values of a degree 1 function along a facet at parameters `t` of the
/// facet, for one component.
fn facet_values<T: RlstScalar>(
    field: &Function<T>,
    comp: usize,
    cell: usize,
    local: [usize; 2],
    t: T::Real,
) -> T
where
    T::Real: RealScalar,
{
    let dofs = field.space().cell_dofs(cell);
    let values = field.component(comp);
    values[dofs[local[0]]] * T::from_real(T::Real::one() - t)
        + values[dofs[local[1]]] * T::from_real(t)
}

/// Assemble the boundary functional `<g . n, v>` over the facets with a
/// marker, where `g` is a degree 1 vector field on the same mesh and `n`
/// the outward facet normal.
pub fn assemble_flux_functional<T: RlstScalar>(
    space: &FunctionSpace<T>,
    field: &Function<T>,
    marker: i32,
) -> BridgeResult<Vec<T>>
where
    T::Real: RealScalar,
{
    require_cg1(space)?;
    require_same_mesh::<T>(space.mesh(), field.space().mesh())?;
    let mesh = space.mesh();
    if field.space().value_size() != mesh.gdim() || field.space().degree() != 1 {
        return Err(BridgeError::Validation(
            "The flux field must be a degree 1 vector field".to_string(),
        ));
    }
    let mut result = vec![T::zero(); space.local_size()];
    boundary_functional(space, marker, &mut result, |cell, local, t| {
        let normal = mesh.facet_normal(cell, local_from_pair(local))?;
        let mut value = T::zero();
        for (d, n) in normal.iter().enumerate() {
            value += facet_values(field, d, cell, local, t) * T::from_real(*n);
        }
        Ok(value)
    })?;
    Ok(result)
}

/// Assemble the boundary functional `<p, v>` over the facets with a
/// marker, where `p` is a scalar degree 1 function on the same mesh.
pub fn assemble_scalar_functional<T: RlstScalar>(
    space: &FunctionSpace<T>,
    field: &Function<T>,
    marker: i32,
) -> BridgeResult<Vec<T>>
where
    T::Real: RealScalar,
{
    require_cg1(space)?;
    require_same_mesh::<T>(space.mesh(), field.space().mesh())?;
    if field.space().value_size() != 1 || field.space().degree() != 1 {
        return Err(BridgeError::Validation(
            "The boundary field must be a scalar degree 1 function".to_string(),
        ));
    }
    let mut result = vec![T::zero(); space.local_size()];
    boundary_functional(space, marker, &mut result, |cell, local, t| {
        Ok(facet_values(field, 0, cell, local, t))
    })?;
    Ok(result)
}

// Recovers the local facet number from its vertex pair.
fn local_from_pair(local: [usize; 2]) -> usize {
    3 - local[0] - local[1]
}

fn boundary_functional<T: RlstScalar>(
    space: &FunctionSpace<T>,
    marker: i32,
    result: &mut [T],
    integrand: impl Fn(usize, [usize; 2], T::Real) -> BridgeResult<T>,
) -> BridgeResult<()>
where
    T::Real: RealScalar,
{
    let mesh = space.mesh();
    // Two point Gauss rule on the facet, exact for cubics
    let offset = num::cast::<f64, T::Real>(0.2886751345948129).unwrap();
    let half = num::cast::<f64, T::Real>(0.5).unwrap();
    let points = [half - offset, half + offset];
    for facet in mesh.exterior_facets() {
        if facet.marker != marker {
            continue;
        }
        let local = crate::grid::FACET_VERTICES[facet.local_facet];
        let dofs = space.cell_dofs(facet.cell);
        let length = mesh.facet_length(facet.cell, facet.local_facet);
        for t in points {
            let value = integrand(facet.cell, local, t)?;
            let weight = T::from_real(half * length);
            result[dofs[local[0]]] += value * T::from_real(T::Real::one() - t) * weight;
            result[dofs[local[1]]] += value * T::from_real(t) * weight;
        }
    }
    Ok(())
}

/// L2 norm of a degree 1 function over its mesh. Vector valued functions
/// contribute all components.
pub fn l2_norm<T: RlstScalar>(f: &Function<T>) -> BridgeResult<T::Real>
where
    T::Real: RealScalar,
{
    let space = f.space();
    if space.degree() != 1 {
        return Err(BridgeError::Validation(
            "L2 norms are only computed for degree 1 functions".to_string(),
        ));
    }
    let mesh = space.mesh();
    let rule = triangle_rule(2)?;
    let mut total = T::Real::zero();
    for cell in 0..mesh.cell_count() {
        let dofs = space.cell_dofs(cell);
        // Weights include the reference area, so scale by 2 area
        let jac = mesh.cell_volume(cell) * num::cast::<f64, T::Real>(2.0).unwrap();
        for q in 0..rule.npoints {
            let x = num::cast::<f64, T::Real>(rule.points[2 * q]).unwrap();
            let y = num::cast::<f64, T::Real>(rule.points[2 * q + 1]).unwrap();
            let phi = [T::Real::one() - x - y, x, y];
            let w = num::cast::<f64, T::Real>(rule.weights[q]).unwrap() * jac;
            for comp in 0..space.value_size() {
                let values = f.component(comp);
                let mut v = T::zero();
                for i in 0..3 {
                    v += values[dofs[i]] * T::from_real(phi[i]);
                }
                total = total + v.abs() * v.abs() * w;
            }
        }
    }
    Ok(total.sqrt())
}
