//! Leaf-distance-labelled merkle trees over published key sets.
//!
//! Every node carries its distance-to-leaves label, its side, and leaf /
//! empty markers; all of that is bound into the node hash prefix, so a
//! proof cannot be replayed at a different position or depth. Trees are
//! balanced with all leaves at the same depth; odd layers are rounded up
//! with empty sibling placeholders.
//!
//! Paths are verified twice, by two independent algorithms
//! ([`Path::verify_ascent`] and [`Path::verify_stack`]) that must agree on
//! every input. Any single-field mutation of a path element makes both
//! fail.
//!
//! [`Path::verify_ascent`]: path::Path::verify_ascent
//! [`Path::verify_stack`]: path::Path::verify_stack

pub mod path;
pub mod tree;
mod verify;

pub use path::{Path, PathElement, PREFIX_SIZE};
pub use tree::MerkleTree;
