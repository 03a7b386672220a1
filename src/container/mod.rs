//! Hierarchical container: tree model, HDF5 binding, reading and writing.
//!
//! The tree is independent of the file:
//! - node: groups, datasets, attributes
//! - h5: owned handles over the HDF5 library
//! - reader / writer: filesystem boundary and the structural copy

mod h5;
pub mod node;
pub mod reader;
pub mod writer;

pub use node::{
    AttrValue, Attributes, Container, Dataset, ElementType, Group, Node, Payload, RawArray,
    RawType, TextStorage, TypedArray,
};
pub use reader::read_container;
pub use writer::{commit, ContainerWriter, CopyOutcome, CopyOutput, CopyPolicy, CopyStats};
