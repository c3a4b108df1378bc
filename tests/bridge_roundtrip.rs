//! Round trip tests for the node correspondence on an annulus.

extern crate blas_src;
extern crate lapack_src;

use approx::assert_relative_eq;
use bembridge::bimesh::BoundaryTag;
use bembridge::bridge::{Bridge, BridgeParams};
use bembridge::context::ComputeContext;
use bembridge::function::{Continuity, Function, FunctionSpace};
use bembridge::shapes;
use bembridge::types::Direction;

const NSEG: usize = 24;

#[test]
fn annulus_round_trip_preserves_coefficients() {
    let ctx = ComputeContext::new();
    let mesh = shapes::annulus::<f64>(1.0, 2.0, NSEG).unwrap();
    let space = FunctionSpace::<f64>::lagrange(&mesh, Continuity::Discontinuous, 1).unwrap();
    let bridge = Bridge::new(&ctx, &space, BridgeParams::default()).unwrap();

    let mut f = Function::new(&space);
    f.interpolate(|x, _| x[0] * x[1] + 0.25).unwrap();
    let marshalled = bridge.apply(Direction::Forward, f.coefficients()).unwrap();
    let back = bridge.apply(Direction::Inverse, &marshalled).unwrap();
    for (a, b) in f.coefficients().iter().zip(&back) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn restricted_bridge_covers_the_inner_circle() {
    let ctx = ComputeContext::new();
    let mesh = shapes::annulus::<f64>(1.0, 2.0, NSEG).unwrap();
    let space = FunctionSpace::<f64>::lagrange(&mesh, Continuity::Discontinuous, 1).unwrap();
    let bridge = Bridge::new(
        &ctx,
        &space,
        BridgeParams {
            boundary_id: Some(BoundaryTag::Marker(1)),
            ..Default::default()
        },
    )
    .unwrap();

    // One interval element with two nodes per inner segment
    assert_eq!(bridge.to_nnodes(), 2 * NSEG);

    // All restricted nodes sit on the inner circle
    let coords = bridge.source().discretization().node_coordinates();
    for node in 0..bridge.to_nnodes() {
        let x = coords[2 * node];
        let y = coords[2 * node + 1];
        assert_relative_eq!((x * x + y * y).sqrt(), 1.0, epsilon = 1e-12);
    }

    // The measure of the restricted geometry is the polygon perimeter
    let perimeter = NSEG as f64 * 2.0 * (std::f64::consts::PI / NSEG as f64).sin();
    assert_relative_eq!(
        bridge.source().discretization().measure(),
        perimeter,
        epsilon = 1e-12
    );

    // A constant survives the trip out and back, supported only on the
    // dofs adjacent to the inner boundary
    let mut f = Function::new(&space);
    f.interpolate(|_, _| 1.0).unwrap();
    let marshalled = bridge.apply(Direction::Forward, f.coefficients()).unwrap();
    assert_eq!(marshalled.len(), 2 * NSEG);
    for v in &marshalled {
        assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
    }
    let back = bridge.apply(Direction::Inverse, &marshalled).unwrap();
    let nonzero = back.iter().filter(|v| v.abs() > 0.5).count();
    assert_eq!(nonzero, 2 * NSEG);
}
