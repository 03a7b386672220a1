//! Structural copy and output commit.
//!
//! [`ContainerWriter`] rebuilds an input tree node by node, applying the
//! [`CopyPolicy`] to names and textual attributes. [`commit`] then writes the
//! finished tree as an HDF5 file next to its destination and renames it into
//! place.

use crate::container::h5::{self, Array, At, H5Error, H5Result, NodeError, attr_location};
use crate::container::node::{
    AttrValue, Attributes, Container, Dataset, Group, Node, Payload, RawArray, RawType,
    TextStorage, TypedArray,
};
use crate::error::{NodeCopyWarning, RepairError, Result};
use crate::sanitize::Sanitizer;
use std::path::Path;
use tracing::{debug, warn};

/// How a copy treats identifiers and attribute text.
#[derive(Debug, Clone, Default)]
pub struct CopyPolicy {
    /// `None` copies every name and value verbatim.
    sanitizer: Option<Sanitizer>,
    /// Root attributes replaced after the copy, bypassing sanitization.
    root_overrides: Attributes,
}

impl CopyPolicy {
    pub fn verbatim() -> Self {
        Self::default()
    }

    pub fn sanitizing(sanitizer: Sanitizer) -> Self {
        Self {
            sanitizer: Some(sanitizer),
            root_overrides: Attributes::new(),
        }
    }

    pub fn with_root_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.root_overrides.set(name, value);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub groups: usize,
    pub datasets: usize,
    pub attributes: usize,
    /// Groups and datasets whose name changed.
    pub renamed_nodes: usize,
    /// Text and text-list attributes whose value changed.
    pub rewritten_attributes: usize,
}

/// Result of copying a single payload-bearing node.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome<T> {
    Copied(T),
    /// High-fidelity copy failed; the node was carried over raw.
    RawFallback { node: T, warning: NodeCopyWarning },
}

#[derive(Debug, Clone)]
pub struct CopyOutput {
    pub container: Container,
    pub stats: CopyStats,
    pub warnings: Vec<NodeCopyWarning>,
}

#[derive(Debug)]
pub struct ContainerWriter {
    policy: CopyPolicy,
    stats: CopyStats,
    warnings: Vec<NodeCopyWarning>,
}

impl ContainerWriter {
    pub fn new(policy: CopyPolicy) -> Self {
        Self {
            policy,
            stats: CopyStats::default(),
            warnings: Vec::new(),
        }
    }

    /// Build the output tree. Fails only on a sibling name collision.
    pub fn copy(mut self, src: &Container) -> Result<CopyOutput> {
        let mut root = self.copy_group("", &src.root)?;
        let overrides = std::mem::take(&mut self.policy.root_overrides);
        for (name, value) in overrides.iter() {
            root.attrs.set(name, value.clone());
        }

        Ok(CopyOutput {
            container: Container::new(root),
            stats: self.stats,
            warnings: self.warnings,
        })
    }

    fn rename(&mut self, name: &str) -> String {
        match &self.policy.sanitizer {
            Some(s) if s.needs_sanitizing(name) => {
                self.stats.renamed_nodes += 1;
                s.sanitize(name)
            }
            _ => name.to_string(),
        }
    }

    fn copy_group(&mut self, path: &str, src: &Group) -> Result<Group> {
        self.stats.groups += 1;
        let mut out = Group::new();
        out.attrs = self.copy_attrs(path, &src.attrs);

        for (name, child) in src.children() {
            let child_path = format!("{}/{}", path, name);
            let new_name = self.rename(name);
            let node = match child {
                Node::Group(g) => Node::Group(self.copy_group(&child_path, g)?),
                Node::Dataset(d) => Node::Dataset(self.copy_dataset(&child_path, d)),
            };
            if out.insert(new_name.clone(), node).is_err() {
                return Err(RepairError::NameCollision {
                    parent: display_path(path).to_string(),
                    name: new_name,
                });
            }
        }
        Ok(out)
    }

    fn copy_dataset(&mut self, path: &str, src: &Dataset) -> Dataset {
        self.stats.datasets += 1;
        let payload = match &src.payload {
            Payload::Numeric(array) => {
                let outcome = copy_array(path, None, array);
                self.settle(outcome)
            }
            Payload::Opaque(raw) => Payload::Opaque(raw.clone()),
        };
        Dataset {
            payload,
            attrs: self.copy_attrs(path, &src.attrs),
        }
    }

    fn copy_attrs(&mut self, path: &str, src: &Attributes) -> Attributes {
        let mut out = Attributes::new();
        for (name, value) in src.iter() {
            self.stats.attributes += 1;
            let copied = match value {
                AttrValue::Text { value, storage } => AttrValue::Text {
                    value: self.rewrite_text(value),
                    storage: *storage,
                },
                AttrValue::TextList { items, storage } => {
                    let before = self.stats.rewritten_attributes;
                    let items = items.iter().map(|s| self.rewrite_text(s)).collect();
                    // Count the attribute once, not once per element.
                    if self.stats.rewritten_attributes > before {
                        self.stats.rewritten_attributes = before + 1;
                    }
                    AttrValue::TextList {
                        items,
                        storage: *storage,
                    }
                }
                AttrValue::Numeric(array) => {
                    let outcome = copy_array(path, Some(name), array);
                    match self.settle(outcome) {
                        Payload::Numeric(array) => AttrValue::Numeric(array),
                        Payload::Opaque(raw) => AttrValue::Opaque(raw),
                    }
                }
                AttrValue::Opaque(raw) => AttrValue::Opaque(raw.clone()),
            };
            out.set(name, copied);
        }
        out
    }

    fn rewrite_text(&mut self, s: &str) -> String {
        match &self.policy.sanitizer {
            Some(san) if san.needs_sanitizing(s) => {
                self.stats.rewritten_attributes += 1;
                san.sanitize(s)
            }
            _ => s.to_string(),
        }
    }

    /// Unwrap an outcome, logging and recording any fallback.
    fn settle<T>(&mut self, outcome: CopyOutcome<T>) -> T {
        match outcome {
            CopyOutcome::Copied(node) => node,
            CopyOutcome::RawFallback { node, warning } => {
                warn!("{}", warning);
                self.warnings.push(warning);
                node
            }
        }
    }
}

/// Copy a typed payload. A payload that does not match its declared type and
/// shape is carried over as untyped bytes instead.
pub fn copy_array(path: &str, attribute: Option<&str>, src: &TypedArray) -> CopyOutcome<Payload> {
    match src.validate() {
        Ok(()) => CopyOutcome::Copied(Payload::Numeric(src.clone())),
        Err(reason) => CopyOutcome::RawFallback {
            node: Payload::Opaque(RawArray::bytes(src.data.clone())),
            warning: NodeCopyWarning {
                path: display_path(path).to_string(),
                attribute: attribute.map(str::to_string),
                reason,
            },
        },
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

/// Write `container` to `path` as an HDF5 file, atomically.
///
/// The file is built under a temporary name in the destination directory,
/// closed, synced and then renamed over `path`. On any error the temporary
/// file is removed and an existing file at `path` is left as it was.
///
/// Links and attributes are created in tree order with creation order
/// tracked, and object timestamps are off, so the same tree always produces
/// the same bytes.
pub fn commit(container: &Container, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let fail = |e| RepairError::io("cannot create output", path, e);

    let tmp = tempfile::Builder::new()
        .prefix(".h5-sanitizer-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(fail)?;
    h5::with_library(|| write_file(container, tmp.path()))
        .map_err(|e| write_error(path, e))?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    debug!(path = %path.display(), "committed output");
    Ok(())
}

/// An existing link is a sibling collision; anything else is a write failure.
fn write_error(path: &Path, e: NodeError) -> RepairError {
    match e.source {
        H5Error::Exists(name) => RepairError::NameCollision { parent: e.at, name },
        source => RepairError::write(path, format!("{}: {source}", e.at)),
    }
}

type WriteResult = std::result::Result<(), NodeError>;

fn write_file(container: &Container, path: &Path) -> WriteResult {
    let file = h5::File::create(path).at("")?;
    write_group(&file.root().at("")?, &container.root, "")?;
    file.close().at("")
}

fn write_group(dst: &h5::Group, src: &Group, path: &str) -> WriteResult {
    write_attrs(&dst.attrs().at(path)?, &src.attrs, path)?;
    for (name, child) in src.children() {
        let child_path = format!("{path}/{name}");
        match child {
            Node::Group(g) => {
                let created = dst.create_group(name).at(path)?;
                write_group(&created, g, &child_path)?;
            }
            Node::Dataset(d) => {
                let (dtype, shape, data) = payload_parts(&d.payload).at(&child_path)?;
                let space = h5::Dataspace::new(shape).at(&child_path)?;
                let created = dst.create_dataset(name, &dtype, &space).at(path)?;
                created.write_bytes(&dtype, data).at(&child_path)?;
                write_attrs(&created.attrs().at(&child_path)?, &d.attrs, &child_path)?;
            }
        }
    }
    Ok(())
}

fn payload_parts(payload: &Payload) -> H5Result<(h5::Datatype, &[u64], &[u8])> {
    Ok(match payload {
        Payload::Numeric(a) => (
            h5::Datatype::numeric(a.dtype)?,
            a.shape.as_slice(),
            a.data.as_slice(),
        ),
        Payload::Opaque(r) => (raw_type(&r.dtype)?, r.shape.as_slice(), r.data.as_slice()),
    })
}

fn raw_type(dtype: &RawType) -> H5Result<h5::Datatype> {
    match dtype {
        RawType::Encoded(bytes) => h5::Datatype::decode(bytes),
        RawType::Bytes => h5::Datatype::raw_bytes(),
    }
}

fn write_attrs(dst: &h5::Attrs<'_>, src: &Attributes, path: &str) -> WriteResult {
    for (name, value) in src.iter() {
        write_attr(dst, name, value).at(&attr_location(path, name))?;
    }
    Ok(())
}

fn write_attr(dst: &h5::Attrs<'_>, name: &str, value: &AttrValue) -> H5Result<()> {
    match value {
        AttrValue::Text { value, storage } => {
            write_text(dst, name, std::slice::from_ref(value), &[], *storage)
        }
        AttrValue::TextList { items, storage } => {
            write_text(dst, name, items, &[items.len() as u64], *storage)
        }
        AttrValue::Numeric(a) => {
            write_array(dst, name, &h5::Datatype::numeric(a.dtype)?, &a.shape, &a.data)
        }
        AttrValue::Opaque(r) => write_array(dst, name, &raw_type(&r.dtype)?, &r.shape, &r.data),
    }
}

fn write_array(
    dst: &h5::Attrs<'_>,
    name: &str,
    dtype: &h5::Datatype,
    shape: &[u64],
    data: &[u8],
) -> H5Result<()> {
    let space = h5::Dataspace::new(shape)?;
    dst.create(name, dtype, &space)?.write_bytes(dtype, data)
}

fn write_text(
    dst: &h5::Attrs<'_>,
    name: &str,
    items: &[String],
    shape: &[u64],
    storage: TextStorage,
) -> H5Result<()> {
    match storage {
        TextStorage::Variable => {
            let dtype = h5::Datatype::variable_string()?;
            let space = h5::Dataspace::new(shape)?;
            dst.create(name, &dtype, &space)?
                .write_var_strings(&dtype, items)
        }
        TextStorage::Fixed => {
            // Cells are as wide as the longest item, like a numpy `S` array.
            let size = items.iter().map(String::len).max().unwrap_or(0).max(1);
            let mut data = Vec::with_capacity(size * items.len());
            for item in items {
                data.extend_from_slice(item.as_bytes());
                data.resize(data.len() + size - item.len(), 0);
            }
            write_array(dst, name, &h5::Datatype::fixed_string(size)?, shape, &data)
        }
    }
}
