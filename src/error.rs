//! Error taxonomy.
//!
//! Everything in [`RepairError`] is fatal: the operation aborts and no output
//! is committed. Per-node copy problems are recovered locally and surface as
//! [`NodeCopyWarning`] in the repair report instead.

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RepairError>;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// The descriptor attribute is not valid JSON (or not text at all).
    #[error("failed to parse {key} descriptor: {reason}")]
    DescriptorParse {
        key: String,
        reason: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("no {key} attribute found at the container root")]
    MissingDescriptor { key: String },

    #[error("{action} {}: {source}", path.display())]
    ContainerIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a readable container: {message}", path.display())]
    ContainerFormat { path: PathBuf, message: String },

    /// The HDF5 library refused part of the output tree.
    #[error("failed to write {}: {message}", path.display())]
    ContainerWrite { path: PathBuf, message: String },

    /// Two siblings map to the same sanitized name.
    #[error("sanitized name '{name}' collides with an existing sibling under '{parent}'")]
    NameCollision { parent: String, name: String },
}

impl RepairError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ContainerIo {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ContainerFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ContainerWrite {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A node whose high-fidelity copy failed and was carried over raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCopyWarning {
    /// Container path of the node, e.g. `/model_weights/dense/kernel:0`.
    pub path: String,
    /// Attribute name when the warning concerns an attribute.
    pub attribute: Option<String>,
    pub reason: String,
}

impl fmt::Display for NodeCopyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(
                f,
                "attribute '{}' on {} copied raw: {}",
                attr, self.path, self.reason
            ),
            None => write!(f, "{} copied raw: {}", self.path, self.reason),
        }
    }
}
