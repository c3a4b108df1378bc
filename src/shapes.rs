//! Builders for simple meshes used in tests and demos.

use crate::grid::{ExteriorFacet, TriangleMesh};
use crate::types::{BridgeError, BridgeResult, RealScalar};
use std::collections::HashMap;

fn cast<R: RealScalar>(x: f64) -> R {
    num::cast::<f64, R>(x).unwrap()
}

/// Unit square split into two triangles.
///
/// Boundary markers: 1 bottom, 2 right, 3 top, 4 left.
pub fn unit_square<R: RealScalar>() -> BridgeResult<TriangleMesh<R>> {
    TriangleMesh::new(
        vec![
            R::zero(),
            R::zero(),
            R::one(),
            R::zero(),
            R::one(),
            R::one(),
            R::zero(),
            R::one(),
        ],
        2,
        vec![[0, 1, 2], [0, 2, 3]],
        vec![
            ExteriorFacet {
                cell: 0,
                local_facet: 2,
                marker: 1,
            },
            ExteriorFacet {
                cell: 0,
                local_facet: 0,
                marker: 2,
            },
            ExteriorFacet {
                cell: 1,
                local_facet: 0,
                marker: 3,
            },
            ExteriorFacet {
                cell: 1,
                local_facet: 1,
                marker: 4,
            },
        ],
    )
}

/// Disk of the given radius triangulated as a fan around the origin.
///
/// The circular boundary carries marker 1.
pub fn disk<R: RealScalar>(radius: f64, nsegments: usize) -> BridgeResult<TriangleMesh<R>> {
    if nsegments < 3 {
        return Err(BridgeError::Validation(format!(
            "A disk needs at least 3 boundary segments, got {nsegments}"
        )));
    }
    let mut coordinates = vec![R::zero(), R::zero()];
    for i in 0..nsegments {
        let theta = 2.0 * std::f64::consts::PI * i as f64 / nsegments as f64;
        coordinates.push(cast(radius * theta.cos()));
        coordinates.push(cast(radius * theta.sin()));
    }
    let mut cells = Vec::with_capacity(nsegments);
    let mut facets = Vec::with_capacity(nsegments);
    for i in 0..nsegments {
        let a = 1 + i;
        let b = 1 + (i + 1) % nsegments;
        cells.push([0, a, b]);
        // The rim edge is opposite the centre vertex
        facets.push(ExteriorFacet {
            cell: i,
            local_facet: 0,
            marker: 1,
        });
    }
    TriangleMesh::new(coordinates, 2, cells, facets)
}

/// Annulus between two concentric circles around the origin.
///
/// The inner boundary carries marker 1, the outer boundary marker 2.
pub fn annulus<R: RealScalar>(
    r_inner: f64,
    r_outer: f64,
    nsegments: usize,
) -> BridgeResult<TriangleMesh<R>> {
    if nsegments < 3 {
        return Err(BridgeError::Validation(format!(
            "An annulus needs at least 3 segments, got {nsegments}"
        )));
    }
    if r_inner <= 0.0 || r_inner >= r_outer {
        return Err(BridgeError::Validation(format!(
            "Invalid annulus radii ({r_inner}, {r_outer})"
        )));
    }
    let mut coordinates = Vec::with_capacity(4 * nsegments);
    for r in [r_inner, r_outer] {
        for i in 0..nsegments {
            let theta = 2.0 * std::f64::consts::PI * i as f64 / nsegments as f64;
            coordinates.push(cast(r * theta.cos()));
            coordinates.push(cast(r * theta.sin()));
        }
    }
    let mut cells = Vec::with_capacity(2 * nsegments);
    let mut facets = Vec::with_capacity(2 * nsegments);
    for i in 0..nsegments {
        let i1 = (i + 1) % nsegments;
        let (inner0, inner1) = (i, i1);
        let (outer0, outer1) = (nsegments + i, nsegments + i1);
        // Lower triangle holds the inner edge, upper one the outer edge
        cells.push([inner0, inner1, outer0]);
        facets.push(ExteriorFacet {
            cell: 2 * i,
            local_facet: 2,
            marker: 1,
        });
        cells.push([inner1, outer1, outer0]);
        facets.push(ExteriorFacet {
            cell: 2 * i + 1,
            local_facet: 0,
            marker: 2,
        });
    }
    TriangleMesh::new(coordinates, 2, cells, facets)
}

/// Sphere obtained by refining an octahedron and projecting onto the
/// unit sphere. All triangles are ordered with outward normals and the
/// mesh is closed, so it has no exterior facets.
pub fn regular_sphere<R: RealScalar>(refinement_level: usize) -> BridgeResult<TriangleMesh<R>> {
    let mut coordinates: Vec<f64> = vec![
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        -1.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, //
        0.0, 0.0, 1.0, //
        0.0, 0.0, -1.0,
    ];
    let mut cells: Vec<[usize; 3]> = vec![
        [0, 1, 4],
        [1, 2, 4],
        [2, 3, 4],
        [3, 0, 4],
        [1, 0, 5],
        [2, 1, 5],
        [3, 2, 5],
        [0, 3, 5],
    ];
    for _ in 0..refinement_level {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut new_cells = Vec::with_capacity(4 * cells.len());
        for cell in &cells {
            let mut mids = [0; 3];
            for (e, (a, b)) in [(cell[0], cell[1]), (cell[1], cell[2]), (cell[0], cell[2])]
                .iter()
                .enumerate()
            {
                let key = (*a.min(b), *a.max(b));
                mids[e] = *midpoints.entry(key).or_insert_with(|| {
                    let mut p = [0.0; 3];
                    let mut norm = 0.0;
                    for d in 0..3 {
                        p[d] = 0.5 * (coordinates[3 * a + d] + coordinates[3 * b + d]);
                        norm += p[d] * p[d];
                    }
                    let norm = norm.sqrt();
                    for x in &mut p {
                        *x /= norm;
                    }
                    coordinates.extend_from_slice(&p);
                    coordinates.len() / 3 - 1
                });
            }
            let [m01, m12, m02] = mids;
            new_cells.push([cell[0], m01, m02]);
            new_cells.push([cell[1], m12, m01]);
            new_cells.push([cell[2], m02, m12]);
            new_cells.push([m01, m12, m02]);
        }
        cells = new_cells;
    }
    let coordinates = coordinates.into_iter().map(cast).collect();
    TriangleMesh::new(coordinates, 3, cells, vec![])
}
