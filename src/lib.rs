//! Bembridge
//!
//! Coupling of finite element and boundary integral discretizations.
//!
//! The crate converts a finite element function space into the mesh
//! representation used by a layer-potential evaluator, keeping a
//! node-for-node correspondence, and marshals field data back and forth
//! between the two orderings. On top of the conversion sit a symbolic
//! operator binder and a matrix-free coupling operator for exterior
//! Helmholtz problems.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

pub mod assembly;
pub mod bimesh;
pub mod bridge;
pub mod context;
pub mod coupling;
pub mod discretization;
pub mod function;
pub mod grid;
pub mod kernels;
pub mod operators;
pub mod quadrature;
pub mod shapes;
pub mod sparse;
pub mod traits;
pub mod types;
