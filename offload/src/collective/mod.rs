//! Collective operations across the ranks of a [`LocalCluster`].

mod cluster;
mod helpers;
mod reduce;

pub use cluster::{Communicator, LocalCluster};
pub use reduce::tree_reduce;
