//! Function spaces and functions.
//!
//! Lagrange spaces of degree one and two on triangle meshes, either
//! continuous or discontinuous. Degrees of freedom are numbered per
//! scalar component; a vector valued function stores its components as
//! consecutive blocks of scalar coefficients.

use crate::grid::TriangleMesh;
use crate::types::{BridgeError, BridgeResult, RealScalar};
use num::Zero;
use rlst::RlstScalar;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Inter-element continuity of a function space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// Continuous across cell boundaries.
    Standard,
    /// Discontinuous across cell boundaries.
    Discontinuous,
}

/// A Lagrange function space on a triangle mesh.
pub struct FunctionSpace<'m, T: RlstScalar>
where
    T::Real: RealScalar,
{
    mesh: &'m TriangleMesh<T::Real>,
    continuity: Continuity,
    degree: usize,
    value_size: usize,
    dofs_per_cell: usize,
    cell_dofs: Vec<usize>,
    local_size: usize,
    _t: PhantomData<T>,
}

impl<'m, T: RlstScalar> FunctionSpace<'m, T>
where
    T::Real: RealScalar,
{
    /// Create a scalar Lagrange space.
    pub fn lagrange(
        mesh: &'m TriangleMesh<T::Real>,
        continuity: Continuity,
        degree: usize,
    ) -> BridgeResult<Self> {
        Self::with_value_size(mesh, continuity, degree, 1)
    }

    /// Create a vector valued Lagrange space with one component per
    /// geometric dimension.
    pub fn vector_lagrange(
        mesh: &'m TriangleMesh<T::Real>,
        continuity: Continuity,
        degree: usize,
    ) -> BridgeResult<Self> {
        Self::with_value_size(mesh, continuity, degree, mesh.gdim())
    }

    fn with_value_size(
        mesh: &'m TriangleMesh<T::Real>,
        continuity: Continuity,
        degree: usize,
        value_size: usize,
    ) -> BridgeResult<Self> {
        if degree != 1 && degree != 2 {
            return Err(BridgeError::Validation(format!(
                "Only Lagrange spaces of degree 1 and 2 are supported, got degree {degree}"
            )));
        }
        let dofs_per_cell = if degree == 1 { 3 } else { 6 };
        let ncells = mesh.cell_count();
        let mut cell_dofs = Vec::with_capacity(ncells * dofs_per_cell);
        let local_size = match continuity {
            Continuity::Discontinuous => {
                for c in 0..ncells {
                    for i in 0..dofs_per_cell {
                        cell_dofs.push(c * dofs_per_cell + i);
                    }
                }
                ncells * dofs_per_cell
            }
            Continuity::Standard => {
                let mut edge_numbers = HashMap::new();
                for c in 0..ncells {
                    let cell = mesh.cell(c);
                    cell_dofs.extend_from_slice(cell);
                    if degree == 2 {
                        // Edge dofs follow the facet numbering of the cell
                        for facet in 0..3 {
                            let [a, b] = mesh.facet_vertices(c, facet);
                            let key = (a.min(b), a.max(b));
                            let next = mesh.vertex_count() + edge_numbers.len();
                            let dof = *edge_numbers.entry(key).or_insert(next);
                            cell_dofs.push(dof);
                        }
                    }
                }
                mesh.vertex_count() + edge_numbers.len()
            }
        };
        Ok(Self {
            mesh,
            continuity,
            degree,
            value_size,
            dofs_per_cell,
            cell_dofs,
            local_size,
            _t: PhantomData,
        })
    }

    /// The mesh the space is defined over.
    pub fn mesh(&self) -> &'m TriangleMesh<T::Real> {
        self.mesh
    }

    /// Continuity of the space.
    pub fn continuity(&self) -> Continuity {
        self.continuity
    }

    /// Polynomial degree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of components of a function value.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Number of scalar degrees of freedom.
    pub fn local_size(&self) -> usize {
        self.local_size
    }

    /// Number of degrees of freedom on each cell.
    pub fn dofs_per_cell(&self) -> usize {
        self.dofs_per_cell
    }

    /// Scalar degrees of freedom attached to a cell.
    pub fn cell_dofs(&self, c: usize) -> &[usize] {
        &self.cell_dofs[c * self.dofs_per_cell..(c + 1) * self.dofs_per_cell]
    }

    /// Coordinates of the point each scalar degree of freedom is
    /// attached to, point-major. Only available for degree one.
    pub fn dof_points(&self) -> BridgeResult<Vec<T::Real>> {
        if self.degree != 1 {
            return Err(BridgeError::Validation(
                "Dof points are only tabulated for degree 1 spaces".to_string(),
            ));
        }
        let gdim = self.mesh.gdim();
        let mut points = vec![T::Real::zero(); self.local_size * gdim];
        for c in 0..self.mesh.cell_count() {
            let cell = self.mesh.cell(c);
            for (i, dof) in self.cell_dofs(c).iter().enumerate() {
                let p = self.mesh.vertex(cell[i]);
                points[dof * gdim..(dof + 1) * gdim].copy_from_slice(p);
            }
        }
        Ok(points)
    }
}

/// A function with coefficients in a [`FunctionSpace`].
pub struct Function<'a, T: RlstScalar>
where
    T::Real: RealScalar,
{
    space: &'a FunctionSpace<'a, T>,
    coefficients: Vec<T>,
}

impl<'a, T: RlstScalar> Function<'a, T>
where
    T::Real: RealScalar,
{
    /// Create a zero function.
    pub fn new(space: &'a FunctionSpace<'a, T>) -> Self {
        Self {
            space,
            coefficients: vec![T::zero(); space.value_size() * space.local_size()],
        }
    }

    /// Create a function from existing coefficients.
    pub fn from_coefficients(
        space: &'a FunctionSpace<'a, T>,
        coefficients: Vec<T>,
    ) -> BridgeResult<Self> {
        let expected = space.value_size() * space.local_size();
        if coefficients.len() != expected {
            return Err(BridgeError::Shape {
                expected,
                actual: coefficients.len(),
            });
        }
        Ok(Self {
            space,
            coefficients,
        })
    }

    /// The space this function lives in.
    pub fn space(&self) -> &'a FunctionSpace<'a, T> {
        self.space
    }

    /// All coefficients, components stored as consecutive blocks.
    pub fn coefficients(&self) -> &[T] {
        &self.coefficients
    }

    /// Mutable access to all coefficients.
    pub fn coefficients_mut(&mut self) -> &mut [T] {
        &mut self.coefficients
    }

    /// Coefficients of one component.
    pub fn component(&self, comp: usize) -> &[T] {
        let n = self.space.local_size();
        &self.coefficients[comp * n..(comp + 1) * n]
    }

    /// Mutable coefficients of one component.
    pub fn component_mut(&mut self, comp: usize) -> &mut [T] {
        let n = self.space.local_size();
        &mut self.coefficients[comp * n..(comp + 1) * n]
    }

    /// Set the coefficients by evaluating a closure at the dof points.
    ///
    /// The closure receives the coordinates of a dof point and the
    /// component number. Only available for degree one spaces.
    pub fn interpolate(&mut self, f: impl Fn(&[T::Real], usize) -> T) -> BridgeResult<()> {
        let gdim = self.space.mesh().gdim();
        let points = self.space.dof_points()?;
        let n = self.space.local_size();
        for comp in 0..self.space.value_size() {
            for dof in 0..n {
                self.coefficients[comp * n + dof] = f(&points[dof * gdim..(dof + 1) * gdim], comp);
            }
        }
        Ok(())
    }

    /// Project a continuous degree one function onto a discontinuous
    /// degree one space on the same mesh. Exact for piecewise linears.
    pub fn project_to(&self, dg_space: &'a FunctionSpace<'a, T>) -> BridgeResult<Function<'a, T>> {
        if self.space.degree() != 1
            || dg_space.degree() != 1
            || dg_space.continuity() != Continuity::Discontinuous
        {
            return Err(BridgeError::Validation(
                "Projection is only supported from degree 1 onto discontinuous degree 1"
                    .to_string(),
            ));
        }
        if dg_space.value_size() != self.space.value_size() {
            return Err(BridgeError::Validation(
                "Projection requires matching value sizes".to_string(),
            ));
        }
        let mut result = Function::new(dg_space);
        let n_from = self.space.local_size();
        let n_to = dg_space.local_size();
        for c in 0..dg_space.mesh().cell_count() {
            let from_dofs = self.space.cell_dofs(c);
            let to_dofs = dg_space.cell_dofs(c);
            for comp in 0..self.space.value_size() {
                for (fd, td) in from_dofs.iter().zip(to_dofs) {
                    result.coefficients[comp * n_to + td] =
                        self.coefficients[comp * n_from + fd];
                }
            }
        }
        Ok(result)
    }
}
