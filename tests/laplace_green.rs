//! Potential-theoretic identities evaluated through the full pipeline.

extern crate blas_src;
extern crate lapack_src;

use approx::assert_relative_eq;
use bembridge::bimesh::{BoundaryTag, Mesh, SimplexElementGroup};
use bembridge::context::ComputeContext;
use bembridge::discretization::{
    Discretization, LayerPotentialSource, PotentialKind, QbxOptions,
};
use bembridge::function::{Continuity, Function, FunctionSpace};
use bembridge::kernels::KernelScalar;
use bembridge::operators::{
    BoundValue, DensityExpr, KernelType, LayerPotentialExpr, OperatorBinder, Substitutions,
};
use bembridge::shapes;
use std::collections::HashMap;
use std::f64::consts::PI;

// Harmonic inside the unit disk: the Laplace Green's function with its
// pole at (3, 3).
fn potential(x: &[f64]) -> f64 {
    let dx = x[0] - 3.0;
    let dy = x[1] - 3.0;
    -(dx * dx + dy * dy).sqrt().ln() / (2.0 * PI)
}

fn potential_gradient(x: &[f64], comp: usize) -> f64 {
    let d = [x[0] - 3.0, x[1] - 3.0];
    let r2 = d[0] * d[0] + d[1] * d[1];
    -d[comp] / (2.0 * PI * r2)
}

/// `u = S[du/dn] - D[u]` for a harmonic function, checked at interior
/// dof points away from the boundary.
#[test]
fn greens_representation_on_a_disk() {
    let ctx = ComputeContext::new();
    let mesh = shapes::disk::<f64>(1.0, 64).unwrap();
    let space = FunctionSpace::<f64>::lagrange(&mesh, Continuity::Discontinuous, 1).unwrap();
    let vector_space =
        FunctionSpace::<f64>::vector_lagrange(&mesh, Continuity::Discontinuous, 1).unwrap();

    let mut binder = OperatorBinder::with_options(
        &ctx,
        QbxOptions {
            fine_order: 5,
            ..Default::default()
        },
    );
    let source = (&space, Some(BoundaryTag::Marker(1)));
    let target = (&space, None);
    let single = binder
        .bind(
            LayerPotentialExpr::single_layer(
                KernelType::Laplace,
                DensityExpr::NormalDot("grad_u".to_string()),
            ),
            source,
            target,
        )
        .unwrap();
    let double = binder
        .bind(
            LayerPotentialExpr::double_layer(
                KernelType::Laplace,
                DensityExpr::Var("u".to_string()),
            ),
            source,
            target,
        )
        .unwrap();

    let mut u = Function::new(&space);
    u.interpolate(|x, _| potential(x)).unwrap();
    let mut grad_u = Function::new(&vector_space);
    grad_u
        .interpolate(|x, comp| potential_gradient(x, comp))
        .unwrap();
    let mut subs = Substitutions::new();
    subs.insert("u".to_string(), BoundValue::Field(&u));
    subs.insert("grad_u".to_string(), BoundValue::Field(&grad_u));

    let mut s = Function::new(&space);
    single.call(&subs, &mut s).unwrap();
    let mut d = Function::new(&space);
    double.call(&subs, &mut d).unwrap();

    let points = space.dof_points().unwrap();
    let mut checked = 0;
    for dof in 0..space.local_size() {
        let x = &points[2 * dof..2 * dof + 2];
        if x[0] * x[0] + x[1] * x[1] > 0.36 {
            continue;
        }
        let reconstructed = s.coefficients()[dof] - d.coefficients()[dof];
        assert_relative_eq!(
            reconstructed,
            potential(x),
            max_relative = 2e-2,
            epsilon = 1e-3
        );
        checked += 1;
    }
    assert!(checked > 0);
}

// A sphere source built directly with outward vertex ordering.
fn sphere_source(level: usize) -> LayerPotentialSource<f64> {
    let tri = shapes::regular_sphere::<f64>(level).unwrap();
    let nvert = tri.vertex_count();
    let mut vertices = vec![0.0; 3 * nvert];
    for v in 0..nvert {
        let p = tri.vertex(v);
        for d in 0..3 {
            vertices[d * nvert + v] = p[d];
        }
    }
    let nel = tri.cell_count();
    let mut vertex_indices = Vec::with_capacity(3 * nel);
    let mut nodes = vec![0.0; 3 * nel * 3];
    for e in 0..nel {
        let cell = tri.cell(e);
        vertex_indices.extend_from_slice(cell);
        for (n, v) in cell.iter().enumerate() {
            let p = tri.vertex(*v);
            for d in 0..3 {
                nodes[(d * nel + e) * 3 + n] = p[d];
            }
        }
    }
    let unit_nodes = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let group = SimplexElementGroup::new(1, 2, 3, vertex_indices, nodes, unit_nodes).unwrap();
    let mesh = Mesh::new(vertices, 3, group, Vec::new(), &HashMap::new()).unwrap();
    let discretization = Discretization::new(mesh, 4).unwrap();
    LayerPotentialSource::new(
        discretization,
        QbxOptions {
            fine_order: 4,
            ..Default::default()
        },
    )
}

/// The double layer potential of a unit density over a closed surface is
/// minus one at every interior point.
#[test]
fn gauss_identity_on_a_sphere() {
    let ctx = ComputeContext::new();
    let source = sphere_source(3);
    let ones = vec![1.0; source.discretization().nnodes()];
    let kernel = f64::laplace_kernel(3).unwrap();
    let targets = vec![0.0, 0.0, 0.0, 0.3, -0.1, 0.2];
    let values = source
        .evaluate(
            &ctx,
            PotentialKind::DoubleLayer,
            &ones,
            kernel.as_ref(),
            &targets,
            false,
        )
        .unwrap();
    assert_eq!(values.len(), 2);
    for v in &values {
        assert_relative_eq!(*v, -1.0, epsilon = 5e-3);
    }
}
