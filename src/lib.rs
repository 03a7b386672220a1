//! Repair model containers whose identifiers contain the reserved path
//! separator.
//!
//! A `/` inside a group, dataset or layer name is read back as a path
//! boundary, so the container no longer loads. Two repairs are offered:
//! - [`repair::patch_descriptor`] rewrites the topology descriptor only
//! - [`repair::sanitize_container`] rewrites every storage identifier and
//!   text attribute

pub mod cli;
pub mod container;
pub mod error;
pub mod graph;
pub mod repair;
pub mod sanitize;

pub use error::{NodeCopyWarning, RepairError, Result};
pub use repair::{RepairConfig, RepairMode, RepairReport, patch_descriptor, sanitize_container};
pub use sanitize::{Sanitizer, sanitize};
