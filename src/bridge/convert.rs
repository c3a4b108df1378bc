//! Conversion of a function space into the layer-potential mesh
//! representation.

use crate::bimesh::{element_group_orientation, BoundaryTag, Mesh, SimplexElementGroup};
use crate::bridge::flip::flip_simplex_element_group;
use crate::function::{Continuity, FunctionSpace};
use crate::types::{BridgeError, BridgeResult, RealScalar};
use num::{One, Zero};
use rlst::{MatrixInverse, RlstScalar};
use std::collections::{BTreeSet, HashMap};

/// Convert the mesh of a function space into the layer-potential
/// representation.
///
/// The space must be a scalar discontinuous Lagrange space of degree one
/// on a triangle mesh. The mesh may be embedded into a higher ambient
/// dimension, in which case trailing coordinates are zero. Negatively
/// oriented elements are flipped; the returned orientation array holds
/// the signed orientations found before flipping, so a negative entry
/// flags an element whose nodes were reordered.
///
/// Boundary markers of the space's mesh are carried over as
/// [`BoundaryTag::Marker`] tags keyed by the vertex sets of their facets.
pub fn convert_function_space<T: RlstScalar>(
    space: &FunctionSpace<T>,
    ambient_dim: usize,
) -> BridgeResult<(Mesh<T::Real>, Vec<T::Real>)>
where
    T::Real: RealScalar + MatrixInverse,
{
    if space.continuity() != Continuity::Discontinuous {
        return Err(BridgeError::Validation(
            "Only discontinuous Lagrange spaces can be converted".to_string(),
        ));
    }
    if space.degree() != 1 {
        return Err(BridgeError::Validation(format!(
            "Only degree 1 spaces can be converted, got degree {}",
            space.degree()
        )));
    }
    if space.value_size() != 1 {
        return Err(BridgeError::Validation(
            "Only scalar valued spaces can be converted".to_string(),
        ));
    }
    let mesh = space.mesh();
    let gdim = mesh.gdim();
    if ambient_dim != 2 && ambient_dim != 3 {
        return Err(BridgeError::Validation(format!(
            "Ambient dimension must be 2 or 3, got {ambient_dim}"
        )));
    }
    if ambient_dim < gdim {
        return Err(BridgeError::Validation(format!(
            "Ambient dimension {ambient_dim} is smaller than the geometric dimension {gdim}"
        )));
    }

    // Vertex array with the vertex index fastest, zero padded to the
    // ambient dimension
    let nvertices = mesh.vertex_count();
    let mut vertices = vec![T::Real::zero(); ambient_dim * nvertices];
    for v in 0..nvertices {
        let p = mesh.vertex(v);
        for d in 0..gdim {
            vertices[d * nvertices + v] = p[d];
        }
    }

    let ncells = mesh.cell_count();
    let mut vertex_indices = Vec::with_capacity(3 * ncells);
    for c in 0..ncells {
        vertex_indices.extend_from_slice(mesh.cell(c));
    }

    // Degree 1 nodes sit at the vertices
    let unit_nodes = vec![
        T::Real::zero(),
        T::Real::zero(),
        T::Real::one(),
        T::Real::zero(),
        T::Real::zero(),
        T::Real::one(),
    ];
    let mut nodes = vec![T::Real::zero(); ambient_dim * ncells * 3];
    for c in 0..ncells {
        let cell = mesh.cell(c);
        for (n, v) in cell.iter().enumerate() {
            let p = mesh.vertex(*v);
            for d in 0..gdim {
                nodes[(d * ncells + c) * 3 + n] = p[d];
            }
        }
    }

    let mut group = SimplexElementGroup::new(1, 2, ambient_dim, vertex_indices, nodes, unit_nodes)?;
    let orientation = element_group_orientation(&vertices, nvertices, ambient_dim, &group)?;
    flip_simplex_element_group(&mut group, &orientation)?;

    let mut boundary_tags = vec![BoundaryTag::All, BoundaryTag::ReallyAll];
    for marker in mesh.unique_markers() {
        boundary_tags.push(BoundaryTag::Marker(marker));
    }

    // Keyed by vertex sets of the original, unflipped facets
    let mut face_to_tags: HashMap<BTreeSet<usize>, Vec<BoundaryTag>> = HashMap::new();
    for facet in mesh.exterior_facets() {
        let key: BTreeSet<usize> = mesh
            .facet_vertices(facet.cell, facet.local_facet)
            .into_iter()
            .collect();
        let tags = face_to_tags.entry(key).or_default();
        let tag = BoundaryTag::Marker(facet.marker);
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let bimesh = Mesh::new(vertices, ambient_dim, group, boundary_tags, &face_to_tags)?;
    Ok((bimesh, orientation))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::TriangleMesh;
    use crate::shapes;
    use approx::assert_relative_eq;

    extern crate blas_src;
    extern crate lapack_src;

    fn dg1(mesh: &TriangleMesh<f64>) -> FunctionSpace<f64> {
        FunctionSpace::lagrange(mesh, Continuity::Discontinuous, 1).unwrap()
    }

    #[test]
    fn test_continuous_space_rejected() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let space = FunctionSpace::<f64>::lagrange(&mesh, Continuity::Standard, 1).unwrap();
        assert!(convert_function_space(&space, 2).is_err());
    }

    #[test]
    fn test_higher_degree_rejected() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let space = FunctionSpace::<f64>::lagrange(&mesh, Continuity::Discontinuous, 2).unwrap();
        assert!(convert_function_space(&space, 2).is_err());
    }

    #[test]
    fn test_vector_space_rejected() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let space =
            FunctionSpace::<f64>::vector_lagrange(&mesh, Continuity::Discontinuous, 1).unwrap();
        assert!(convert_function_space(&space, 2).is_err());
    }

    #[test]
    fn test_bad_ambient_dimension_rejected() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let space = dg1(&mesh);
        assert!(convert_function_space(&space, 1).is_err());
        assert!(convert_function_space(&space, 4).is_err());
        let sphere = shapes::regular_sphere::<f64>(0).unwrap();
        let space = dg1(&sphere);
        assert!(convert_function_space(&space, 2).is_err());
    }

    #[test]
    fn test_unit_square_conversion() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let space = dg1(&mesh);
        let (bimesh, orientation) = convert_function_space(&space, 2).unwrap();
        assert_eq!(bimesh.nvertices(), 4);
        assert_eq!(bimesh.group().nelements(), 2);
        assert_eq!(orientation.len(), 2);
        // Both triangles are positively oriented already
        assert!(orientation.iter().all(|o| *o > 0.0));
        // Nodes coincide with the cell vertices
        for e in 0..2 {
            let ev = bimesh.group().element_vertices(e);
            for (n, v) in ev.iter().enumerate() {
                for d in 0..2 {
                    assert_relative_eq!(
                        bimesh.group().node(d, e, n),
                        bimesh.vertex(d, *v),
                        epsilon = 1e-14
                    );
                }
            }
        }
        // All four boundary markers are carried over
        assert_eq!(bimesh.boundary_tags().len(), 6);
        assert_eq!(bimesh.boundary_faces().len(), 4);
    }

    #[test]
    fn test_embedding_pads_with_zeros() {
        let mesh = shapes::unit_square::<f64>().unwrap();
        let space = dg1(&mesh);
        let (bimesh, _) = convert_function_space(&space, 3).unwrap();
        assert_eq!(bimesh.ambient_dim(), 3);
        for v in 0..bimesh.nvertices() {
            assert_eq!(bimesh.vertex(2, v), 0.0);
        }
        for e in 0..bimesh.group().nelements() {
            for n in 0..3 {
                assert_eq!(bimesh.group().node(2, e, n), 0.0);
            }
        }
    }

    #[test]
    fn test_reversed_cell_is_flipped() {
        // Same square but with the first cell's vertex order reversed
        let mesh = TriangleMesh::new(
            vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            2,
            vec![[1, 0, 2], [0, 2, 3]],
            vec![],
        )
        .unwrap();
        let space = dg1(&mesh);
        let (bimesh, orientation) = convert_function_space(&space, 2).unwrap();
        assert!(orientation[0] < 0.0);
        assert!(orientation[1] > 0.0);
        // After flipping, the group's own orientation test is non-negative
        let recomputed = element_group_orientation(
            bimesh.vertices(),
            bimesh.nvertices(),
            2,
            bimesh.group(),
        )
        .unwrap();
        assert!(recomputed.iter().all(|o| *o >= 0.0));
    }

    #[test]
    fn test_closed_surface_has_no_boundary_faces() {
        let sphere = shapes::regular_sphere::<f64>(1).unwrap();
        let space = dg1(&sphere);
        let (bimesh, orientation) = convert_function_space(&space, 3).unwrap();
        assert_eq!(orientation.len(), 32);
        assert!(bimesh.boundary_faces().is_empty());
        assert_eq!(bimesh.boundary_tags().len(), 2);
    }
}
