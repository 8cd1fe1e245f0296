#![warn(unused_extern_crates)]
//! Sparse octree voxels that fuse color and semantic label observations and
//! propagate them up to coarser nodes on demand.

pub use glam;

mod error;
pub use error::*;

mod color;
pub use color::*;

mod semantics;
pub use semantics::*;

mod label_map;
pub use label_map::*;

mod octant_key;
pub use octant_key::*;

pub mod node;
pub use node::{ OctreeNode, SemanticPayload, SemanticVoxel };

pub mod aggregate;
pub use aggregate::AggregateStats;

mod tree;
pub use tree::*;

pub mod io;

pub mod registry;
pub use registry::{ AbstractOctree, TreeRegistry, register_semantic_octree };
