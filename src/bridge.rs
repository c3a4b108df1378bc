//! Conversion of function spaces into the layer-potential mesh
//! representation and marshalling of data between the two orderings.

pub mod connection;
pub mod convert;
pub mod flip;

pub use connection::{Bridge, BridgeParams, NodePermutation};
pub use convert::convert_function_space;
pub use flip::{flip_matrix, flip_simplex_element_group};
