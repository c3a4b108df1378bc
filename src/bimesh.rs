//! Mesh representation used by the layer-potential evaluator.
//!
//! A [`Mesh`] stores vertices as an `[ambient_dim, nvertices]` array and
//! one [`SimplexElementGroup`] holding per-element node coordinates in an
//! `[ambient_dim, nelements, nunit_nodes]` array, together with boundary
//! tags and the facial adjacency of tagged boundary faces.

use crate::grid::FACET_VERTICES;
use crate::types::{BridgeError, BridgeResult, RealScalar};
use std::collections::{BTreeSet, HashMap};

/// Tag identifying a part of the mesh boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoundaryTag {
    /// Every boundary face.
    All,
    /// Every boundary face, including faces only reachable through
    /// special connectivity.
    ReallyAll,
    /// Faces carrying a user supplied marker.
    Marker(i32),
}

/// A group of simplex elements of equal order and dimension.
#[derive(Debug, Clone)]
pub struct SimplexElementGroup<R: RealScalar> {
    order: usize,
    dim: usize,
    ambient_dim: usize,
    nelements: usize,
    nunit_nodes: usize,
    vertex_indices: Vec<usize>,
    nodes: Vec<R>,
    unit_nodes: Vec<R>,
}

impl<R: RealScalar> SimplexElementGroup<R> {
    /// Create an element group.
    ///
    /// `vertex_indices` is `[nelements, nvertices_per_element]` row-major,
    /// `nodes` is `[ambient_dim, nelements, nunit_nodes]` with the node
    /// index fastest, and `unit_nodes` is point-major on the reference
    /// simplex.
    pub fn new(
        order: usize,
        dim: usize,
        ambient_dim: usize,
        vertex_indices: Vec<usize>,
        nodes: Vec<R>,
        unit_nodes: Vec<R>,
    ) -> BridgeResult<Self> {
        let vpe = dim + 1;
        if vertex_indices.len() % vpe != 0 {
            return Err(BridgeError::Shape {
                expected: vpe * (vertex_indices.len() / vpe + 1),
                actual: vertex_indices.len(),
            });
        }
        let nelements = vertex_indices.len() / vpe;
        if unit_nodes.len() % dim != 0 {
            return Err(BridgeError::Shape {
                expected: dim * (unit_nodes.len() / dim + 1),
                actual: unit_nodes.len(),
            });
        }
        let nunit_nodes = unit_nodes.len() / dim;
        if nodes.len() != ambient_dim * nelements * nunit_nodes {
            return Err(BridgeError::Shape {
                expected: ambient_dim * nelements * nunit_nodes,
                actual: nodes.len(),
            });
        }
        Ok(Self {
            order,
            dim,
            ambient_dim,
            nelements,
            nunit_nodes,
            vertex_indices,
            nodes,
            unit_nodes,
        })
    }

    /// Polynomial order of the nodal representation.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Topological dimension of the elements.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Dimension of the embedding space.
    pub fn ambient_dim(&self) -> usize {
        self.ambient_dim
    }

    /// Number of elements.
    pub fn nelements(&self) -> usize {
        self.nelements
    }

    /// Number of nodes per element.
    pub fn nunit_nodes(&self) -> usize {
        self.nunit_nodes
    }

    /// Total number of nodes.
    pub fn nnodes(&self) -> usize {
        self.nelements * self.nunit_nodes
    }

    /// Vertices per element.
    pub fn nvertices_per_element(&self) -> usize {
        self.dim + 1
    }

    /// Global vertex numbers of an element.
    pub fn element_vertices(&self, e: usize) -> &[usize] {
        let vpe = self.nvertices_per_element();
        &self.vertex_indices[e * vpe..(e + 1) * vpe]
    }

    /// One coordinate of one node of one element.
    pub fn node(&self, axis: usize, element: usize, node: usize) -> R {
        self.nodes[(axis * self.nelements + element) * self.nunit_nodes + node]
    }

    /// Reference coordinates of the unit nodes, point-major.
    pub fn unit_nodes(&self) -> &[R] {
        &self.unit_nodes
    }

    pub(crate) fn swap_element_vertices(&mut self, e: usize, i: usize, j: usize) {
        let vpe = self.nvertices_per_element();
        self.vertex_indices.swap(e * vpe + i, e * vpe + j);
    }

    pub(crate) fn set_element_nodes(&mut self, axis: usize, element: usize, values: &[R]) {
        let start = (axis * self.nelements + element) * self.nunit_nodes;
        self.nodes[start..start + self.nunit_nodes].copy_from_slice(values);
    }

    pub(crate) fn element_nodes(&self, axis: usize, element: usize) -> &[R] {
        let start = (axis * self.nelements + element) * self.nunit_nodes;
        &self.nodes[start..start + self.nunit_nodes]
    }
}

/// A boundary face of an element group with its tags.
#[derive(Debug, Clone)]
pub struct BoundaryFace {
    /// Element the face belongs to.
    pub element: usize,
    /// Local face number within the element.
    pub face: usize,
    /// User supplied markers attached to the face.
    pub tags: Vec<BoundaryTag>,
}

/// Mesh in the layer-potential evaluator's representation.
#[derive(Debug, Clone)]
pub struct Mesh<R: RealScalar> {
    vertices: Vec<R>,
    ambient_dim: usize,
    nvertices: usize,
    group: SimplexElementGroup<R>,
    boundary_tags: Vec<BoundaryTag>,
    boundary_faces: Vec<BoundaryFace>,
}

impl<R: RealScalar> Mesh<R> {
    /// Create a mesh from a vertex array, one element group, the list of
    /// declared boundary tags and a map from boundary face vertex sets to
    /// markers.
    ///
    /// `vertices` is `[ambient_dim, nvertices]` with the vertex index
    /// fastest. The facial adjacency of tagged faces is computed here by
    /// matching each element face's vertex set against the map; vertex
    /// sets are order independent, so the match survives any flipping of
    /// element vertex order.
    pub fn new(
        vertices: Vec<R>,
        ambient_dim: usize,
        group: SimplexElementGroup<R>,
        boundary_tags: Vec<BoundaryTag>,
        face_to_tags: &HashMap<BTreeSet<usize>, Vec<BoundaryTag>>,
    ) -> BridgeResult<Self> {
        if vertices.len() % ambient_dim != 0 {
            return Err(BridgeError::Shape {
                expected: ambient_dim * (vertices.len() / ambient_dim + 1),
                actual: vertices.len(),
            });
        }
        let nvertices = vertices.len() / ambient_dim;
        if group.ambient_dim() != ambient_dim {
            return Err(BridgeError::Validation(format!(
                "Element group has ambient dimension {}, mesh has {}",
                group.ambient_dim(),
                ambient_dim
            )));
        }
        let mut boundary_faces = Vec::new();
        if group.dim() == 2 {
            for e in 0..group.nelements() {
                let ev = group.element_vertices(e);
                for (face, local) in FACET_VERTICES.iter().enumerate() {
                    let key: BTreeSet<usize> = local.iter().map(|&i| ev[i]).collect();
                    if let Some(tags) = face_to_tags.get(&key) {
                        boundary_faces.push(BoundaryFace {
                            element: e,
                            face,
                            tags: tags.clone(),
                        });
                    }
                }
            }
        }
        Ok(Self {
            vertices,
            ambient_dim,
            nvertices,
            group,
            boundary_tags,
            boundary_faces,
        })
    }

    /// Dimension of the embedding space.
    pub fn ambient_dim(&self) -> usize {
        self.ambient_dim
    }

    /// Number of vertices.
    pub fn nvertices(&self) -> usize {
        self.nvertices
    }

    /// One coordinate of a vertex.
    pub fn vertex(&self, axis: usize, v: usize) -> R {
        self.vertices[axis * self.nvertices + v]
    }

    /// The vertex array, `[ambient_dim, nvertices]` with vertex fastest.
    pub fn vertices(&self) -> &[R] {
        &self.vertices
    }

    /// The element group.
    pub fn group(&self) -> &SimplexElementGroup<R> {
        &self.group
    }

    /// Declared boundary tags.
    pub fn boundary_tags(&self) -> &[BoundaryTag] {
        &self.boundary_tags
    }

    /// Tagged boundary faces.
    pub fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.boundary_faces
    }

    /// Boundary faces matching a tag. [`BoundaryTag::All`] and
    /// [`BoundaryTag::ReallyAll`] match every tagged boundary face.
    pub fn faces_with_tag(&self, tag: BoundaryTag) -> Vec<&BoundaryFace> {
        self.boundary_faces
            .iter()
            .filter(|f| match tag {
                BoundaryTag::All | BoundaryTag::ReallyAll => true,
                BoundaryTag::Marker(_) => f.tags.contains(&tag),
            })
            .collect()
    }
}

/// Signed orientation of each element of a group.
///
/// In two dimensions this is the signed area spanned by the first two
/// edge vectors. For surfaces embedded in three dimensions the
/// out-of-plane component of the edge cross product is used, which is
/// only meaningful for meshes embedded along a degenerate axis.
pub fn element_group_orientation<R: RealScalar>(
    vertices: &[R],
    nvertices: usize,
    ambient_dim: usize,
    group: &SimplexElementGroup<R>,
) -> BridgeResult<Vec<R>> {
    if group.dim() != 2 {
        return Err(BridgeError::Validation(format!(
            "Orientation is only defined for triangle groups, got dimension {}",
            group.dim()
        )));
    }
    let coord = |axis: usize, v: usize| vertices[axis * nvertices + v];
    let mut orientation = Vec::with_capacity(group.nelements());
    for e in 0..group.nelements() {
        let ev = group.element_vertices(e);
        let mut e1 = [R::zero(); 3];
        let mut e2 = [R::zero(); 3];
        for d in 0..ambient_dim {
            e1[d] = coord(d, ev[1]) - coord(d, ev[0]);
            e2[d] = coord(d, ev[2]) - coord(d, ev[0]);
        }
        match ambient_dim {
            // Signed area in the plane; for surfaces in 3d this is the
            // out-of-plane component of the edge cross product
            2 | 3 => orientation.push(e1[0] * e2[1] - e1[1] * e2[0]),
            _ => {
                return Err(BridgeError::Validation(format!(
                    "Orientation is not defined in ambient dimension {ambient_dim}"
                )))
            }
        }
    }
    Ok(orientation)
}

#[cfg(test)]
mod test {
    use super::*;

    fn square_group() -> (Vec<f64>, SimplexElementGroup<f64>) {
        // Unit square as two triangles, vertex-fastest layout
        let vertices = vec![
            0.0, 1.0, 1.0, 0.0, // x
            0.0, 0.0, 1.0, 1.0, // y
        ];
        let unit_nodes = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let mut nodes = vec![0.0; 2 * 2 * 3];
        let vertex_indices = vec![0, 1, 2, 0, 2, 3];
        for e in 0..2 {
            for (n, v) in vertex_indices[3 * e..3 * e + 3].iter().enumerate() {
                for a in 0..2 {
                    nodes[(a * 2 + e) * 3 + n] = vertices[a * 4 + v];
                }
            }
        }
        let group = SimplexElementGroup::new(1, 2, 2, vertex_indices, nodes, unit_nodes).unwrap();
        (vertices, group)
    }

    #[test]
    fn test_orientation_positive() {
        let (vertices, group) = square_group();
        let orient = element_group_orientation(&vertices, 4, 2, &group).unwrap();
        assert!(orient.iter().all(|o| *o > 0.0));
    }

    #[test]
    fn test_orientation_flips_sign_with_vertex_order() {
        let (vertices, mut group) = square_group();
        group.swap_element_vertices(0, 0, 1);
        let orient = element_group_orientation(&vertices, 4, 2, &group).unwrap();
        assert!(orient[0] < 0.0);
        assert!(orient[1] > 0.0);
    }

    #[test]
    fn test_boundary_face_matching() {
        let (vertices, group) = square_group();
        let mut face_to_tags = HashMap::new();
        face_to_tags.insert(
            BTreeSet::from([0, 1]),
            vec![BoundaryTag::Marker(1)],
        );
        face_to_tags.insert(
            BTreeSet::from([1, 2]),
            vec![BoundaryTag::Marker(2)],
        );
        let mesh = Mesh::new(
            vertices,
            2,
            group,
            vec![BoundaryTag::All, BoundaryTag::ReallyAll],
            &face_to_tags,
        )
        .unwrap();
        assert_eq!(mesh.boundary_faces().len(), 2);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::All).len(), 2);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::Marker(1)).len(), 1);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::Marker(7)).len(), 0);
        // Face {0, 1} is opposite local vertex 2 of element 0
        let f = &mesh.faces_with_tag(BoundaryTag::Marker(1))[0];
        assert_eq!((f.element, f.face), (0, 2));
    }
}
