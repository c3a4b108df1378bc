//! The bridge between a function space and a layer-potential source.

use crate::bimesh::BoundaryTag;
use crate::bridge::convert::convert_function_space;
use crate::bridge::flip::flip_matrix;
use crate::context::ComputeContext;
use crate::discretization::{
    make_face_restriction, Discretization, FaceRestriction, LayerPotentialSource, QbxOptions,
};
use crate::function::FunctionSpace;
use crate::types::{BridgeError, BridgeResult, Direction, RealScalar};
use num::Zero;
use once_cell::sync::OnceCell;
use rlst::{DynamicArray, MatrixInverse, RandomAccessByRef, RlstScalar};

/// Options controlling bridge construction.
#[derive(Debug, Clone, Copy)]
pub struct BridgeParams {
    /// Ambient dimension of the converted mesh. Defaults to the
    /// geometric dimension of the space's mesh.
    pub ambient_dim: Option<usize>,
    /// Restrict the source geometry to boundary faces with this tag.
    pub boundary_id: Option<BoundaryTag>,
    /// Tolerance of the node correspondence check.
    pub tolerance: f64,
    /// Expansion orders passed on to the potential source.
    pub qbx: QbxOptions,
}

impl Default for BridgeParams {
    fn default() -> Self {
        Self {
            ambient_dim: None,
            boundary_id: None,
            tolerance: 1e-5,
            qbx: QbxOptions::default(),
        }
    }
}

/// Bijection between function space dofs and mesh nodes.
///
/// Maps the dof numbered `cell_dofs(c)[i]` to the node `i` of element
/// `c`, before any orientation flip is applied.
pub struct NodePermutation {
    fe_to_bi: Vec<usize>,
    bi_to_fe: Vec<usize>,
}

impl NodePermutation {
    /// Node index for each dof.
    pub fn fe_to_bi(&self) -> &[usize] {
        &self.fe_to_bi
    }

    /// Dof index for each node.
    pub fn bi_to_fe(&self) -> &[usize] {
        &self.bi_to_fe
    }
}

/// Connection between a function space and the layer-potential
/// representation of its mesh.
///
/// The bridge owns the converted mesh, its quadrature discretization
/// and, when a boundary tag was given, the restriction of the geometry
/// to the tagged faces. It is the single authority on how field data
/// moves between the two orderings.
pub struct Bridge<'a, T: RlstScalar + MatrixInverse>
where
    T::Real: RealScalar + MatrixInverse,
{
    space: &'a FunctionSpace<'a, T>,
    orientation: Vec<T::Real>,
    permutation: NodePermutation,
    full_source: LayerPotentialSource<T::Real>,
    restriction: Option<FaceRestriction>,
    restricted_source: Option<LayerPotentialSource<T::Real>>,
    flip: OnceCell<DynamicArray<T, 2>>,
}

impl<'a, T: RlstScalar + MatrixInverse> Bridge<'a, T>
where
    T::Real: RealScalar + MatrixInverse,
{
    /// Convert the space's mesh and establish the node correspondence.
    pub fn new(
        _ctx: &ComputeContext,
        space: &'a FunctionSpace<'a, T>,
        params: BridgeParams,
    ) -> BridgeResult<Self> {
        let ambient_dim = params.ambient_dim.unwrap_or(space.mesh().gdim());
        let (bimesh, orientation) = convert_function_space(space, ambient_dim)?;
        let full_discr = Discretization::new(bimesh, params.qbx.fine_order)?;

        let permutation = Self::build_permutation(space, &full_discr, params.tolerance)?;

        let (restriction, restricted_source) = match params.boundary_id {
            Some(tag) => {
                let (bmesh, restriction) = make_face_restriction(full_discr.mesh(), tag)?;
                let discr = Discretization::new(bmesh, params.qbx.fine_order)?;
                (
                    Some(restriction),
                    Some(LayerPotentialSource::new(discr, params.qbx)),
                )
            }
            None => (None, None),
        };
        let full_source = LayerPotentialSource::new(full_discr, params.qbx);

        log::debug!(
            "Built bridge with {} dofs, {} flipped elements, restriction: {}",
            space.local_size(),
            orientation.iter().filter(|o| **o < T::Real::zero()).count(),
            restriction.is_some()
        );

        Ok(Self {
            space,
            orientation,
            permutation,
            full_source,
            restriction,
            restricted_source,
            flip: OnceCell::new(),
        })
    }

    fn build_permutation(
        space: &FunctionSpace<'a, T>,
        discr: &Discretization<T::Real>,
        tolerance: f64,
    ) -> BridgeResult<NodePermutation> {
        let nnodes = discr.nnodes();
        if space.local_size() != nnodes {
            return Err(BridgeError::Shape {
                expected: nnodes,
                actual: space.local_size(),
            });
        }
        let nunit = discr.mesh().group().nunit_nodes();
        let mut fe_to_bi = vec![usize::MAX; space.local_size()];
        let mut bi_to_fe = vec![usize::MAX; nnodes];
        for c in 0..space.mesh().cell_count() {
            for (i, dof) in space.cell_dofs(c).iter().enumerate() {
                let node = c * nunit + i;
                if fe_to_bi[*dof] != usize::MAX {
                    return Err(BridgeError::Validation(format!(
                        "Dof {dof} is attached to more than one node"
                    )));
                }
                fe_to_bi[*dof] = node;
                bi_to_fe[node] = *dof;
            }
        }
        if fe_to_bi.contains(&usize::MAX) {
            return Err(BridgeError::Validation(
                "Node correspondence is not a bijection".to_string(),
            ));
        }

        // At degree one, flipping only permutes nodes within an element,
        // so the dof points of every cell must coincide with the node
        // coordinates of its element as sets.
        let tol = num::cast::<f64, T::Real>(tolerance).unwrap();
        let gdim = space.mesh().gdim();
        let ambient = discr.mesh().ambient_dim();
        let points = space.dof_points()?;
        let group = discr.mesh().group();
        for c in 0..space.mesh().cell_count() {
            for dof in space.cell_dofs(c) {
                let p = &points[dof * gdim..(dof + 1) * gdim];
                let mut matched = false;
                'nodes: for n in 0..nunit {
                    for d in 0..gdim {
                        if (group.node(d, c, n) - p[d]).abs() > tol {
                            continue 'nodes;
                        }
                    }
                    for d in gdim..ambient {
                        if group.node(d, c, n).abs() > tol {
                            continue 'nodes;
                        }
                    }
                    matched = true;
                    break;
                }
                if !matched {
                    return Err(BridgeError::Validation(format!(
                        "Dof {dof} has no matching node in element {c}"
                    )));
                }
            }
        }
        Ok(NodePermutation { fe_to_bi, bi_to_fe })
    }

    /// The function space this bridge was built from.
    pub fn space(&self) -> &'a FunctionSpace<'a, T> {
        self.space
    }

    /// Signed element orientations found during conversion, before any
    /// flipping. Negative entries flag flipped elements.
    pub fn orientation(&self) -> &[T::Real] {
        &self.orientation
    }

    /// The dof to node bijection.
    pub fn permutation(&self) -> &NodePermutation {
        &self.permutation
    }

    /// The potential source the bridge exposes, restricted to the
    /// boundary when a boundary tag was given.
    pub fn source(&self) -> &LayerPotentialSource<T::Real> {
        self.restricted_source.as_ref().unwrap_or(&self.full_source)
    }

    /// The unrestricted source over the whole converted mesh.
    pub fn full_source(&self) -> &LayerPotentialSource<T::Real> {
        &self.full_source
    }

    /// The boundary restriction, if one was requested.
    pub fn restriction(&self) -> Option<&FaceRestriction> {
        self.restriction.as_ref()
    }

    /// Number of nodes data is marshalled to.
    pub fn to_nnodes(&self) -> usize {
        match &self.restriction {
            Some(r) => r.nnodes(),
            None => self.full_source.discretization().nnodes(),
        }
    }

    fn flip_matrix(&self) -> BridgeResult<&DynamicArray<T, 2>> {
        self.flip.get_or_try_init(|| {
            let group = self.full_source.discretization().mesh().group();
            flip_matrix::<T>(group.unit_nodes(), group.dim(), group.order())
        })
    }

    /// Reorder dof data into node order or back.
    ///
    /// The forward direction gathers dof values onto the nodes of the
    /// full converted mesh and resamples flipped elements; the inverse
    /// direction undoes both.
    pub fn reorder(&self, direction: Direction, values: &[T]) -> BridgeResult<Vec<T>> {
        let nnodes = self.full_source.discretization().nnodes();
        if values.len() != nnodes {
            return Err(BridgeError::Shape {
                expected: nnodes,
                actual: values.len(),
            });
        }
        let nunit = self.full_source.discretization().mesh().group().nunit_nodes();
        let flip = self.flip_matrix()?;
        let mut result = vec![T::zero(); nnodes];
        match direction {
            Direction::Forward => {
                for (dof, node) in self.permutation.fe_to_bi.iter().enumerate() {
                    result[*node] = values[dof];
                }
                self.apply_flip(flip, nunit, &mut result);
            }
            Direction::Inverse => {
                let mut unflipped = values.to_vec();
                // The flip matrix is an involution, so it undoes itself
                self.apply_flip(flip, nunit, &mut unflipped);
                for (dof, node) in self.permutation.fe_to_bi.iter().enumerate() {
                    result[dof] = unflipped[*node];
                }
            }
        }
        Ok(result)
    }

    fn apply_flip(&self, flip: &DynamicArray<T, 2>, nunit: usize, values: &mut [T]) {
        let mut scratch = vec![T::zero(); nunit];
        for (e, orient) in self.orientation.iter().enumerate() {
            if *orient >= T::Real::zero() {
                continue;
            }
            let chunk = &mut values[e * nunit..(e + 1) * nunit];
            for (i, s) in scratch.iter_mut().enumerate() {
                let mut value = T::zero();
                for (j, v) in chunk.iter().enumerate() {
                    value += *flip.get([i, j]).unwrap() * *v;
                }
                *s = value;
            }
            chunk.copy_from_slice(&scratch);
        }
    }

    /// Marshal dof data to the nodes of the exposed source, or back.
    ///
    /// Forward, dof values are reordered onto the full mesh and, when a
    /// restriction is active, gathered onto the boundary nodes. Inverse,
    /// boundary node values are scattered back with zeros at nodes that
    /// have no boundary counterpart, then reordered into dof order.
    pub fn apply(&self, direction: Direction, values: &[T]) -> BridgeResult<Vec<T>> {
        match direction {
            Direction::Forward => {
                let reordered = self.reorder(Direction::Forward, values)?;
                match &self.restriction {
                    Some(r) => r.interpolate(&reordered),
                    None => Ok(reordered),
                }
            }
            Direction::Inverse => {
                let full = match &self.restriction {
                    Some(r) => r.scatter(values, T::zero())?,
                    None => values.to_vec(),
                };
                self.reorder(Direction::Inverse, &full)
            }
        }
    }
}
