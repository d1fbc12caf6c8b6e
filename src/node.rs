//! Hierarchy nodes.
//!
//! Groups and datasets are nodes of a store hierarchy, addressed by a [`NodePath`] from the root.
//! Every segment of a path is a valid [`NodeName`].

mod node_name;
mod node_path;

pub use node_name::{NodeName, NodeNameError};
pub use node_path::{NodePath, NodePathError};
