//! Finite element meshes.
//!
//! A [`TriangleMesh`] is a straight-sided triangulation of topological
//! dimension two embedded in two or three dimensional space, together
//! with its labelled exterior facets. Local facet `i` of a triangle is
//! the edge opposite vertex `i`.

use crate::types::{BridgeError, BridgeResult, RealScalar};

/// Local vertex numbers of each triangle facet. Facet `i` is opposite
/// vertex `i`.
pub const FACET_VERTICES: [[usize; 2]; 3] = [[1, 2], [0, 2], [0, 1]];

/// An exterior facet with its boundary marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExteriorFacet {
    /// Cell the facet belongs to.
    pub cell: usize,
    /// Local facet number within the cell.
    pub local_facet: usize,
    /// Boundary marker attached to the facet.
    pub marker: i32,
}

/// A triangulation with boundary markers.
#[derive(Debug, Clone)]
pub struct TriangleMesh<R: RealScalar> {
    coordinates: Vec<R>,
    gdim: usize,
    cells: Vec<[usize; 3]>,
    exterior_facets: Vec<ExteriorFacet>,
}

impl<R: RealScalar> TriangleMesh<R> {
    /// Create a mesh from point-major vertex coordinates, cell to vertex
    /// connectivity and labelled exterior facets.
    pub fn new(
        coordinates: Vec<R>,
        gdim: usize,
        cells: Vec<[usize; 3]>,
        exterior_facets: Vec<ExteriorFacet>,
    ) -> BridgeResult<Self> {
        if gdim != 2 && gdim != 3 {
            return Err(BridgeError::Validation(format!(
                "Geometric dimension must be 2 or 3, got {gdim}"
            )));
        }
        if coordinates.len() % gdim != 0 {
            return Err(BridgeError::Shape {
                expected: gdim * (coordinates.len() / gdim + 1),
                actual: coordinates.len(),
            });
        }
        let nvertices = coordinates.len() / gdim;
        for cell in &cells {
            for v in cell {
                if *v >= nvertices {
                    return Err(BridgeError::Validation(format!(
                        "Cell refers to vertex {v} but the mesh has {nvertices} vertices"
                    )));
                }
            }
        }
        for facet in &exterior_facets {
            if facet.cell >= cells.len() || facet.local_facet >= 3 {
                return Err(BridgeError::Validation(format!(
                    "Invalid exterior facet ({}, {})",
                    facet.cell, facet.local_facet
                )));
            }
        }
        Ok(Self {
            coordinates,
            gdim,
            cells,
            exterior_facets,
        })
    }

    /// Topological dimension. Always two.
    pub fn tdim(&self) -> usize {
        2
    }

    /// Geometric dimension.
    pub fn gdim(&self) -> usize {
        self.gdim
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.coordinates.len() / self.gdim
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Coordinates of a vertex.
    pub fn vertex(&self, v: usize) -> &[R] {
        &self.coordinates[v * self.gdim..(v + 1) * self.gdim]
    }

    /// Vertex numbers of a cell.
    pub fn cell(&self, c: usize) -> &[usize; 3] {
        &self.cells[c]
    }

    /// All cells.
    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    /// Labelled exterior facets.
    pub fn exterior_facets(&self) -> &[ExteriorFacet] {
        &self.exterior_facets
    }

    /// Global vertex numbers of a local facet of a cell.
    pub fn facet_vertices(&self, cell: usize, local_facet: usize) -> [usize; 2] {
        let c = &self.cells[cell];
        let [a, b] = FACET_VERTICES[local_facet];
        [c[a], c[b]]
    }

    /// Sorted distinct boundary markers present in the mesh.
    pub fn unique_markers(&self) -> Vec<i32> {
        let mut markers: Vec<i32> = self.exterior_facets.iter().map(|f| f.marker).collect();
        markers.sort_unstable();
        markers.dedup();
        markers
    }

    /// Area of a cell.
    pub fn cell_volume(&self, c: usize) -> R {
        let [v0, v1, v2] = self.cells[c];
        let p0 = self.vertex(v0);
        let p1 = self.vertex(v1);
        let p2 = self.vertex(v2);
        match self.gdim {
            2 => {
                let det = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p1[1] - p0[1]) * (p2[0] - p0[0]);
                num::Float::abs(det) / num::cast::<f64, R>(2.0).unwrap()
            }
            _ => {
                let e1 = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
                let e2 = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
                let cx = e1[1] * e2[2] - e1[2] * e2[1];
                let cy = e1[2] * e2[0] - e1[0] * e2[2];
                let cz = e1[0] * e2[1] - e1[1] * e2[0];
                num::Float::sqrt(cx * cx + cy * cy + cz * cz) / num::cast::<f64, R>(2.0).unwrap()
            }
        }
    }

    /// Length of a facet of a cell.
    pub fn facet_length(&self, cell: usize, local_facet: usize) -> R {
        let [a, b] = self.facet_vertices(cell, local_facet);
        let pa = self.vertex(a);
        let pb = self.vertex(b);
        let mut sum = R::zero();
        for d in 0..self.gdim {
            sum = sum + (pb[d] - pa[d]) * (pb[d] - pa[d]);
        }
        num::Float::sqrt(sum)
    }

    /// Unit normal of a facet, pointing away from the cell interior.
    ///
    /// Only defined for planar meshes. The sign is fixed against the
    /// vertex opposite the facet so it does not depend on vertex order.
    pub fn facet_normal(&self, cell: usize, local_facet: usize) -> BridgeResult<[R; 2]> {
        if self.gdim != 2 {
            return Err(BridgeError::Validation(
                "Facet normals are only defined for planar meshes".to_string(),
            ));
        }
        let [a, b] = self.facet_vertices(cell, local_facet);
        let opp = self.cells[cell][local_facet];
        let pa = self.vertex(a);
        let pb = self.vertex(b);
        let po = self.vertex(opp);
        let t = [pb[0] - pa[0], pb[1] - pa[1]];
        let len = num::Float::sqrt(t[0] * t[0] + t[1] * t[1]);
        if len == R::zero() {
            return Err(BridgeError::Degenerate(format!(
                "Zero length facet ({cell}, {local_facet})"
            )));
        }
        let mut n = [t[1] / len, -t[0] / len];
        let to_opp = [po[0] - pa[0], po[1] - pa[1]];
        if n[0] * to_opp[0] + n[1] * to_opp[1] > R::zero() {
            n = [-n[0], -n[1]];
        }
        Ok(n)
    }
}
