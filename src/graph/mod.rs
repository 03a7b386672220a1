//! Graph descriptor handling: the JSON topology stored at the container root.
//!
//! - walk: where layer names live (definitions, connection heads, endpoints)
//! - rewrite: sanitize every one of them and serialize back
//! - refs: read-only definition/reference audit
//! - nonfinite: `NaN` / `Infinity` literals written by Python's json module

mod nonfinite;
pub mod refs;
pub mod rewrite;
pub mod walk;

pub use refs::LayerGraph;
pub use rewrite::{RewriteStats, Rewritten, rewrite_descriptor, rewrite_value};
pub use walk::{LayerNameVisitor, walk};
