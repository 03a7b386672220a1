//! Repair modes.
//!
//! - Mode A, [`patch_descriptor`]: graph-aware rewrite of the root descriptor
//!   only; every other byte of the container is copied as is.
//! - Mode B, [`sanitize_container`]: character-wise sanitize of every group
//!   and dataset name and every text attribute, descriptor included.
//!
//! Both read the input once, build the output in memory and commit it
//! atomically. Any error means no output was written.

use crate::container::{
    AttrValue, Container, ContainerWriter, CopyOutput, CopyPolicy, CopyStats, TextStorage, commit,
    read_container,
};
use crate::error::{NodeCopyWarning, RepairError, Result};
use crate::graph::{LayerGraph, RewriteStats, rewrite_descriptor};
use crate::sanitize::Sanitizer;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Root attribute holding the model topology.
pub const DESCRIPTOR_KEY: &str = "model_config";

#[derive(Debug, Clone)]
pub struct RepairConfig {
    pub sanitizer: Sanitizer,
    pub descriptor_key: String,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            sanitizer: Sanitizer::default(),
            descriptor_key: DESCRIPTOR_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    DescriptorPatch,
    FullSanitize,
}

impl fmt::Display for RepairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairMode::DescriptorPatch => f.write_str("descriptor patch"),
            RepairMode::FullSanitize => f.write_str("full sanitize"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepairReport {
    pub mode: RepairMode,
    pub copy: CopyStats,
    pub warnings: Vec<NodeCopyWarning>,
    /// Set by Mode A only.
    pub descriptor: Option<RewriteStats>,
}

/// Mode A: rewrite the descriptor's layer names and copy everything else
/// verbatim.
pub fn patch_descriptor(
    input: &Path,
    output: &Path,
    config: &RepairConfig,
) -> Result<RepairReport> {
    let key = config.descriptor_key.as_str();
    info!(input = %input.display(), "reading model");
    let src = read_container(input)?;

    let (text, storage) = descriptor_text(&src, key)?;
    info!(chars = text.len(), "found {} attribute", key);

    let rewritten = rewrite_descriptor(text, &config.sanitizer).map_err(|e| {
        RepairError::DescriptorParse {
            key: key.to_string(),
            reason: e.to_string(),
            source: Some(e),
        }
    })?;
    audit(text, &rewritten.text);

    let descriptor = AttrValue::Text {
        value: rewritten.text,
        storage,
    };
    let policy = CopyPolicy::verbatim().with_root_attr(key, descriptor);
    let copied = ContainerWriter::new(policy).copy(&src)?;
    finish(RepairMode::DescriptorPatch, copied, Some(rewritten.stats), output)
}

/// Mode B: sanitize every identifier and textual attribute in the container.
///
/// Not graph-aware: the descriptor is treated as plain text. Character-wise
/// replacement of the separator touches a superset of what Mode A rewrites,
/// so the two stay aligned as long as they share the sanitizer.
pub fn sanitize_container(
    input: &Path,
    output: &Path,
    config: &RepairConfig,
) -> Result<RepairReport> {
    info!(input = %input.display(), "reading container");
    let src = read_container(input)?;

    let copied = ContainerWriter::new(CopyPolicy::sanitizing(config.sanitizer)).copy(&src)?;
    finish(RepairMode::FullSanitize, copied, None, output)
}

/// The descriptor text and the string type it is stored under, which the
/// patched value keeps.
fn descriptor_text<'a>(src: &'a Container, key: &str) -> Result<(&'a str, TextStorage)> {
    match src.root.attrs.get(key) {
        None => Err(RepairError::MissingDescriptor {
            key: key.to_string(),
        }),
        Some(AttrValue::Text { value, storage }) => Ok((value.as_str(), *storage)),
        Some(AttrValue::Opaque(_)) => Err(RepairError::DescriptorParse {
            key: key.to_string(),
            reason: "attribute is not valid UTF-8 text".to_string(),
            source: None,
        }),
        Some(_) => Err(RepairError::DescriptorParse {
            key: key.to_string(),
            reason: "attribute is not a text value".to_string(),
            source: None,
        }),
    }
}

/// Log how the reference picture changed. Diagnostic only.
fn audit(before: &str, after: &str) {
    let (Ok(before), Ok(after)) = (LayerGraph::parse(before), LayerGraph::parse(after)) else {
        return;
    };
    debug!(
        layers = after.definitions.len(),
        references = after.references.len(),
        "descriptor references"
    );
    let dangling_before = before.dangling().len();
    let dangling_after = after.dangling();
    if dangling_after.len() > dangling_before {
        warn!(
            dangling = ?dangling_after,
            "rewrite left references without a matching layer"
        );
    }
}

fn finish(
    mode: RepairMode,
    copied: CopyOutput,
    descriptor: Option<RewriteStats>,
    output: &Path,
) -> Result<RepairReport> {
    info!(output = %output.display(), "writing {}", mode);
    commit(&copied.container, output)?;

    Ok(RepairReport {
        mode,
        copy: copied.stats,
        warnings: copied.warnings,
        descriptor,
    })
}
