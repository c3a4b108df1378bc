//! Quadrature discretizations and layer-potential sources.
//!
//! A [`Discretization`] augments a mesh with per-element quadrature
//! geometry. Layer potentials can only be evaluated from codimension one
//! discretizations, a surface in three dimensions or a curve in two; a
//! codimension zero discretization still provides node coordinates so it
//! can serve as an evaluation target.

use crate::bimesh::{BoundaryTag, Mesh, SimplexElementGroup};
use crate::context::ComputeContext;
use crate::grid::FACET_VERTICES;
use crate::quadrature::{interval_rule, triangle_rule};
use crate::traits::KernelEvaluator;
use crate::types::{BridgeError, BridgeResult, RealScalar};
use rayon::prelude::*;
use rlst::RlstScalar;
use std::collections::HashMap;

/// Expansion and summation orders for a layer-potential source.
#[derive(Debug, Clone, Copy)]
pub struct QbxOptions {
    /// Order of the upsampled quadrature used for potential evaluation.
    pub fine_order: usize,
    /// Order of the local expansions.
    pub qbx_order: usize,
    /// Order of the far-field summation.
    pub fmm_order: usize,
}

impl Default for QbxOptions {
    fn default() -> Self {
        Self {
            fine_order: 1,
            qbx_order: 1,
            fmm_order: 1,
        }
    }
}

/// Which layer potential to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotentialKind {
    /// Single layer potential.
    SingleLayer,
    /// Double layer potential.
    DoubleLayer,
}

/// A mesh with per-element quadrature geometry.
pub struct Discretization<R: RealScalar> {
    mesh: Mesh<R>,
    codim: usize,
    nq: usize,
    // Quadrature point coordinates, point-major per element
    quad_points: Vec<R>,
    // Quadrature weights scaled by the Jacobian determinant
    quad_weights: Vec<R>,
    // Unit normal per element
    normals: Vec<R>,
    // P1 basis values at the quadrature points, node fastest
    basis: Vec<R>,
}

impl<R: RealScalar> Discretization<R> {
    /// Build the quadrature geometry for a mesh.
    ///
    /// `fine_order` selects the polynomial degree of the underlying
    /// quadrature rule, capped at the highest tabulated rule.
    pub fn new(mesh: Mesh<R>, fine_order: usize) -> BridgeResult<Self> {
        if mesh.group().order() != 1 {
            return Err(BridgeError::Validation(format!(
                "Only order 1 element groups are supported, got order {}",
                mesh.group().order()
            )));
        }
        let dim = mesh.group().dim();
        let ambient = mesh.ambient_dim();
        let codim = ambient - dim;
        match (dim, ambient) {
            (2, 2) => {
                // Planar target-only discretization, no surface quadrature
                return Ok(Self {
                    mesh,
                    codim: 0,
                    nq: 0,
                    quad_points: Vec::new(),
                    quad_weights: Vec::new(),
                    normals: Vec::new(),
                    basis: Vec::new(),
                });
            }
            (2, 3) | (1, 2) => {}
            _ => {
                return Err(BridgeError::Validation(format!(
                    "Unsupported element dimension {dim} in ambient dimension {ambient}"
                )));
            }
        }

        let rule = match dim {
            1 => interval_rule(fine_order.clamp(1, 5))?,
            _ => triangle_rule(fine_order.clamp(1, 4))?,
        };
        let nq = rule.npoints;
        let nunit = mesh.group().nunit_nodes();
        if nunit != dim + 1 {
            return Err(BridgeError::Validation(format!(
                "Order 1 groups must have {} nodes per element, got {nunit}",
                dim + 1
            )));
        }

        // P1 basis values at the rule points
        let mut basis = vec![R::zero(); nq * nunit];
        for q in 0..nq {
            let p = &rule.points[q * dim..(q + 1) * dim];
            match dim {
                1 => {
                    basis[q * nunit] = num::cast::<f64, R>(1.0 - p[0]).unwrap();
                    basis[q * nunit + 1] = num::cast::<f64, R>(p[0]).unwrap();
                }
                _ => {
                    basis[q * nunit] = num::cast::<f64, R>(1.0 - p[0] - p[1]).unwrap();
                    basis[q * nunit + 1] = num::cast::<f64, R>(p[0]).unwrap();
                    basis[q * nunit + 2] = num::cast::<f64, R>(p[1]).unwrap();
                }
            }
        }

        let group = mesh.group();
        let nelements = group.nelements();
        let mut quad_points = vec![R::zero(); nelements * nq * ambient];
        let mut quad_weights = vec![R::zero(); nelements * nq];
        let mut normals = vec![R::zero(); nelements * ambient];
        for e in 0..nelements {
            let (jdet, normal) = match dim {
                1 => {
                    let t = [
                        group.node(0, e, 1) - group.node(0, e, 0),
                        group.node(1, e, 1) - group.node(1, e, 0),
                    ];
                    let len = num::Float::sqrt(t[0] * t[0] + t[1] * t[1]);
                    if len == R::zero() {
                        return Err(BridgeError::Degenerate(format!(
                            "Element {e} has zero length"
                        )));
                    }
                    (len, vec![t[1] / len, -t[0] / len])
                }
                _ => {
                    let mut e1 = [R::zero(); 3];
                    let mut e2 = [R::zero(); 3];
                    for d in 0..3 {
                        e1[d] = group.node(d, e, 1) - group.node(d, e, 0);
                        e2[d] = group.node(d, e, 2) - group.node(d, e, 0);
                    }
                    let cross = [
                        e1[1] * e2[2] - e1[2] * e2[1],
                        e1[2] * e2[0] - e1[0] * e2[2],
                        e1[0] * e2[1] - e1[1] * e2[0],
                    ];
                    let len = num::Float::sqrt(
                        cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2],
                    );
                    if len == R::zero() {
                        return Err(BridgeError::Degenerate(format!(
                            "Element {e} has zero area"
                        )));
                    }
                    (len, vec![cross[0] / len, cross[1] / len, cross[2] / len])
                }
            };
            normals[e * ambient..(e + 1) * ambient].copy_from_slice(&normal);
            for q in 0..nq {
                quad_weights[e * nq + q] = num::cast::<f64, R>(rule.weights[q]).unwrap() * jdet;
                for d in 0..ambient {
                    let mut x = R::zero();
                    for n in 0..nunit {
                        x = x + basis[q * nunit + n] * group.node(d, e, n);
                    }
                    quad_points[(e * nq + q) * ambient + d] = x;
                }
            }
        }

        Ok(Self {
            mesh,
            codim,
            nq,
            quad_points,
            quad_weights,
            normals,
            basis,
        })
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &Mesh<R> {
        &self.mesh
    }

    /// Codimension of the elements in the ambient space.
    pub fn codim(&self) -> usize {
        self.codim
    }

    /// Number of quadrature points per element.
    pub fn quad_points_per_element(&self) -> usize {
        self.nq
    }

    /// Total number of nodes.
    pub fn nnodes(&self) -> usize {
        self.mesh.group().nnodes()
    }

    /// Node coordinates, point-major, with nodes numbered element-major.
    pub fn node_coordinates(&self) -> Vec<R> {
        let group = self.mesh.group();
        let ambient = self.mesh.ambient_dim();
        let nunit = group.nunit_nodes();
        let mut coords = vec![R::zero(); group.nnodes() * ambient];
        for e in 0..group.nelements() {
            for n in 0..nunit {
                for d in 0..ambient {
                    coords[(e * nunit + n) * ambient + d] = group.node(d, e, n);
                }
            }
        }
        coords
    }

    /// Unit normal per node, point-major. Requires codimension one.
    pub fn node_normals(&self) -> BridgeResult<Vec<R>> {
        if self.codim != 1 {
            return Err(BridgeError::Validation(
                "Normals are only defined for codimension one discretizations".to_string(),
            ));
        }
        let group = self.mesh.group();
        let ambient = self.mesh.ambient_dim();
        let nunit = group.nunit_nodes();
        let mut normals = vec![R::zero(); group.nnodes() * ambient];
        for e in 0..group.nelements() {
            for n in 0..nunit {
                normals[(e * nunit + n) * ambient..(e * nunit + n + 1) * ambient]
                    .copy_from_slice(&self.normals[e * ambient..(e + 1) * ambient]);
            }
        }
        Ok(normals)
    }

    /// Sum of all quadrature weights, the measure of the discretized
    /// geometry. Zero for codimension zero discretizations.
    pub fn measure(&self) -> R {
        let mut total = R::zero();
        for w in &self.quad_weights {
            total = total + *w;
        }
        total
    }
}

/// A codimension one discretization that layer potentials are evaluated
/// from.
pub struct LayerPotentialSource<R: RealScalar> {
    discretization: Discretization<R>,
    options: QbxOptions,
}

impl<R: RealScalar> LayerPotentialSource<R> {
    /// Wrap a discretization as a potential source.
    pub fn new(discretization: Discretization<R>, options: QbxOptions) -> Self {
        Self {
            discretization,
            options,
        }
    }

    /// The underlying discretization.
    pub fn discretization(&self) -> &Discretization<R> {
        &self.discretization
    }

    /// Expansion orders.
    pub fn options(&self) -> &QbxOptions {
        &self.options
    }

    /// Evaluate a layer potential of a nodal density at target points.
    ///
    /// `density` holds one coefficient per source node in element-major
    /// node order and `targets` is point-major. With `gradient` set the
    /// result holds the target-gradient components as consecutive blocks
    /// of one value per target, otherwise one value per target. Targets
    /// must be separated from the source geometry; no singular quadrature
    /// is applied.
    pub fn evaluate<T: RlstScalar<Real = R>>(
        &self,
        ctx: &ComputeContext,
        kind: PotentialKind,
        density: &[T],
        kernel: &dyn KernelEvaluator<T = T>,
        targets: &[R],
        gradient: bool,
    ) -> BridgeResult<Vec<T>> {
        let discr = &self.discretization;
        if discr.codim() != 1 {
            return Err(BridgeError::Validation(
                "Layer potentials require a codimension one source".to_string(),
            ));
        }
        if density.len() != discr.nnodes() {
            return Err(BridgeError::Shape {
                expected: discr.nnodes(),
                actual: density.len(),
            });
        }
        let ambient = discr.mesh().ambient_dim();
        if kernel.space_dimension() != ambient {
            return Err(BridgeError::Validation(format!(
                "Kernel dimension {} does not match ambient dimension {ambient}",
                kernel.space_dimension()
            )));
        }
        if targets.len() % ambient != 0 {
            return Err(BridgeError::Shape {
                expected: ambient * (targets.len() / ambient + 1),
                actual: targets.len(),
            });
        }
        let ntargets = targets.len() / ambient;
        let group = discr.mesh().group();
        let nunit = group.nunit_nodes();
        let nq = discr.nq;
        let nsources = group.nelements() * nq;
        let dsize = kernel.deriv_size();

        // Density and normals at the quadrature points, weights folded in
        let mut weighted = vec![T::zero(); nsources];
        let mut source_normals = vec![R::zero(); nsources * ambient];
        for e in 0..group.nelements() {
            for q in 0..nq {
                let s = e * nq + q;
                let mut value = T::zero();
                for n in 0..nunit {
                    value += T::from_real(discr.basis[q * nunit + n]) * density[e * nunit + n];
                }
                weighted[s] = value * T::from_real(discr.quad_weights[s]);
                source_normals[s * ambient..(s + 1) * ambient]
                    .copy_from_slice(&discr.normals[e * ambient..(e + 1) * ambient]);
            }
        }
        let sources = &discr.quad_points;

        let ncomponents = if gradient { ambient } else { 1 };
        let per_target: Vec<Vec<T>> = ctx.run(|| {
            (0..ntargets)
                .into_par_iter()
                .map(|j| {
                    let target = &targets[j * ambient..(j + 1) * ambient];
                    let mut acc = vec![T::zero(); ncomponents];
                    if kind == PotentialKind::DoubleLayer && gradient {
                        // Needs second derivatives, evaluated pairwise
                        let mut pair = vec![T::zero(); ambient];
                        for s in 0..nsources {
                            kernel.normal_target_gradient(
                                &sources[s * ambient..(s + 1) * ambient],
                                &source_normals[s * ambient..(s + 1) * ambient],
                                target,
                                &mut pair,
                            );
                            for d in 0..ambient {
                                acc[d] += weighted[s] * pair[d];
                            }
                        }
                    } else {
                        let mut table = vec![T::zero(); nsources * dsize];
                        kernel.assemble_st(sources, target, &mut table);
                        match (kind, gradient) {
                            (PotentialKind::SingleLayer, false) => {
                                for s in 0..nsources {
                                    acc[0] += weighted[s] * table[s * dsize];
                                }
                            }
                            (PotentialKind::SingleLayer, true) => {
                                for s in 0..nsources {
                                    for d in 0..ambient {
                                        acc[d] += weighted[s] * table[s * dsize + 1 + d];
                                    }
                                }
                            }
                            (PotentialKind::DoubleLayer, false) => {
                                // d/dn at the source is minus the target
                                // derivative dotted with the source normal
                                for s in 0..nsources {
                                    let mut dn = T::zero();
                                    for d in 0..ambient {
                                        dn -= table[s * dsize + 1 + d]
                                            * T::from_real(source_normals[s * ambient + d]);
                                    }
                                    acc[0] += weighted[s] * dn;
                                }
                            }
                            (PotentialKind::DoubleLayer, true) => unreachable!(),
                        }
                    }
                    acc
                })
                .collect()
        });

        let mut result = vec![T::zero(); ncomponents * ntargets];
        for (j, acc) in per_target.iter().enumerate() {
            for (c, value) in acc.iter().enumerate() {
                result[c * ntargets + j] = *value;
            }
        }
        Ok(result)
    }
}

/// Restriction of a discretization to tagged boundary faces.
///
/// Holds, for every node of the boundary mesh, the index of the node of
/// the parent mesh it was taken from.
pub struct FaceRestriction {
    from_nodes: Vec<usize>,
    parent_nnodes: usize,
}

impl FaceRestriction {
    /// Node index into the parent discretization for each boundary node.
    pub fn from_nodes(&self) -> &[usize] {
        &self.from_nodes
    }

    /// Number of nodes of the parent discretization.
    pub fn parent_nnodes(&self) -> usize {
        self.parent_nnodes
    }

    /// Number of boundary nodes.
    pub fn nnodes(&self) -> usize {
        self.from_nodes.len()
    }

    /// Gather parent node data onto the boundary nodes.
    pub fn interpolate<V: Copy>(&self, parent: &[V]) -> BridgeResult<Vec<V>> {
        if parent.len() != self.parent_nnodes {
            return Err(BridgeError::Shape {
                expected: self.parent_nnodes,
                actual: parent.len(),
            });
        }
        Ok(self.from_nodes.iter().map(|&i| parent[i]).collect())
    }

    /// Scatter boundary node data back to the parent nodes, filling
    /// nodes without a boundary counterpart with `fill`.
    pub fn scatter<V: Copy>(&self, boundary: &[V], fill: V) -> BridgeResult<Vec<V>> {
        if boundary.len() != self.from_nodes.len() {
            return Err(BridgeError::Shape {
                expected: self.from_nodes.len(),
                actual: boundary.len(),
            });
        }
        let mut parent = vec![fill; self.parent_nnodes];
        for (b, &p) in self.from_nodes.iter().enumerate() {
            parent[p] = boundary[b];
        }
        Ok(parent)
    }
}

/// Extract the boundary faces with a tag as an interval mesh.
///
/// Only planar triangle meshes are supported. The interval vertex order
/// is chosen so that rotating the tangent clockwise yields the normal
/// pointing away from the parent element, which is the convention the
/// quadrature geometry uses.
pub fn make_face_restriction<R: RealScalar>(
    mesh: &Mesh<R>,
    tag: BoundaryTag,
) -> BridgeResult<(Mesh<R>, FaceRestriction)> {
    if mesh.group().dim() != 2 || mesh.ambient_dim() != 2 {
        return Err(BridgeError::Validation(
            "Face restriction is only supported for planar triangle meshes".to_string(),
        ));
    }
    let faces = mesh.faces_with_tag(tag);
    if faces.is_empty() {
        return Err(BridgeError::Validation(format!(
            "No boundary faces carry the tag {tag:?}"
        )));
    }
    let group = mesh.group();
    let nunit_parent = group.nunit_nodes();
    let nelements = faces.len();
    let mut vertex_indices = Vec::with_capacity(2 * nelements);
    let mut from_nodes = Vec::with_capacity(2 * nelements);
    let mut nodes = vec![R::zero(); 2 * nelements * 2];
    for (k, face) in faces.iter().enumerate() {
        let ev = group.element_vertices(face.element);
        let [mut la, mut lb] = FACET_VERTICES[face.face];
        let opposite = ev[face.face];
        // Fix the orientation against the opposite vertex
        let pa = [mesh.vertex(0, ev[la]), mesh.vertex(1, ev[la])];
        let pb = [mesh.vertex(0, ev[lb]), mesh.vertex(1, ev[lb])];
        let po = [mesh.vertex(0, opposite), mesh.vertex(1, opposite)];
        let n = [pb[1] - pa[1], pa[0] - pb[0]];
        if n[0] * (po[0] - pa[0]) + n[1] * (po[1] - pa[1]) > R::zero() {
            std::mem::swap(&mut la, &mut lb);
        }
        for (i, l) in [la, lb].into_iter().enumerate() {
            vertex_indices.push(ev[l]);
            from_nodes.push(face.element * nunit_parent + l);
            for d in 0..2 {
                nodes[(d * nelements + k) * 2 + i] = mesh.vertex(d, ev[l]);
            }
        }
    }
    let unit_nodes = vec![R::zero(), R::one()];
    let bgroup = SimplexElementGroup::new(1, 1, 2, vertex_indices, nodes, unit_nodes)?;
    let bmesh = Mesh::new(
        mesh.vertices().to_vec(),
        2,
        bgroup,
        Vec::new(),
        &HashMap::new(),
    )?;
    let restriction = FaceRestriction {
        from_nodes,
        parent_nnodes: group.nnodes(),
    };
    Ok((bmesh, restriction))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bridge::convert::convert_function_space;
    use crate::function::{Continuity, FunctionSpace};
    use crate::shapes;
    use approx::assert_relative_eq;

    extern crate blas_src;
    extern crate lapack_src;

    fn converted(mesh: &crate::grid::TriangleMesh<f64>, ambient: usize) -> Mesh<f64> {
        let space = FunctionSpace::<f64>::lagrange(mesh, Continuity::Discontinuous, 1).unwrap();
        convert_function_space(&space, ambient).unwrap().0
    }

    #[test]
    fn test_flat_surface_measure() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let discr = Discretization::new(converted(&mesh, 3), 2).unwrap();
        assert_eq!(discr.codim(), 1);
        assert_relative_eq!(discr.measure(), 1.0, epsilon = 1e-13);
    }

    #[test]
    fn test_planar_mesh_is_target_only() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let discr = Discretization::new(converted(&mesh, 2), 2).unwrap();
        assert_eq!(discr.codim(), 0);
        assert_eq!(discr.nnodes(), 6);
        assert!(discr.node_normals().is_err());
    }

    #[test]
    fn test_node_coordinates_layout() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let discr = Discretization::new(converted(&mesh, 2), 2).unwrap();
        let coords = discr.node_coordinates();
        let group = discr.mesh().group();
        for e in 0..group.nelements() {
            for n in 0..3 {
                for d in 0..2 {
                    assert_eq!(coords[(e * 3 + n) * 2 + d], group.node(d, e, n));
                }
            }
        }
    }

    #[test]
    fn test_circle_restriction_geometry() {
        let mesh = shapes::disk::<f64>(2.0, 64).unwrap();
        let full = converted(&mesh, 2);
        let (bmesh, restriction) = make_face_restriction(&full, BoundaryTag::All).unwrap();
        assert_eq!(bmesh.group().nelements(), 64);
        assert_eq!(restriction.nnodes(), 128);
        let discr = Discretization::new(bmesh, 3).unwrap();
        assert_eq!(discr.codim(), 1);
        // Total length of the polygonal rim
        let expected = 64.0 * 2.0 * 2.0 * (std::f64::consts::PI / 64.0).sin();
        assert_relative_eq!(discr.measure(), expected, epsilon = 1e-12);
        // Normals point away from the origin
        let group = discr.mesh().group();
        for e in 0..group.nelements() {
            let mid = [
                0.5 * (group.node(0, e, 0) + group.node(0, e, 1)),
                0.5 * (group.node(1, e, 0) + group.node(1, e, 1)),
            ];
            let n = &discr.normals[e * 2..(e + 1) * 2];
            assert!(n[0] * mid[0] + n[1] * mid[1] > 0.0);
        }
    }

    #[test]
    fn test_restriction_gather_scatter() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let full = converted(&mesh, 2);
        let (_, restriction) = make_face_restriction(&full, BoundaryTag::All).unwrap();
        let parent: Vec<f64> = (0..restriction.parent_nnodes()).map(|i| i as f64).collect();
        let boundary = restriction.interpolate(&parent).unwrap();
        let back = restriction.scatter(&boundary, -1.0).unwrap();
        for (i, v) in back.iter().enumerate() {
            if boundary.contains(&(i as f64)) {
                assert_eq!(*v, i as f64);
            } else {
                assert_eq!(*v, -1.0);
            }
        }
    }

    #[test]
    fn test_missing_tag_is_an_error() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let full = converted(&mesh, 2);
        assert!(make_face_restriction(&full, BoundaryTag::Marker(99)).is_err());
    }
}
