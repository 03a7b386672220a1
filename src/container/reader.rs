//! Reading an HDF5 file into a [`Container`].
//!
//! Attribute values are mapped by datatype:
//! - variable-length strings: `Text` for a scalar, `TextList` for one dimension
//! - fixed-length strings: the same with [`TextStorage::Fixed`], unless the
//!   bytes are not UTF-8
//! - 1, 2, 4 and 8 byte integers, 32 and 64 bit floats: `Numeric`
//! - any other type without pointers inside: `Opaque`, under the encoded
//!   source datatype
//!
//! Variable-length sequences, references and committed datatypes are refused.

use crate::container::h5::{
    self, Array, At, H5Error, H5Result, Layout, Member, NodeError, StrPad, attr_location,
};
use crate::container::node::{
    AttrValue, Attributes, Container, Dataset, Group, Node, Payload, RawArray, RawType,
    TextStorage, TypedArray,
};
use crate::error::{RepairError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

type ReadResult<T> = std::result::Result<T, NodeError>;

/// Open an HDF5 file read-only and load the whole tree.
///
/// The file is closed before returning, so the caller is free to commit an
/// output over the same path afterwards.
pub fn read_container(path: &Path) -> Result<Container> {
    let meta = fs::File::open(path)
        .and_then(|f| f.metadata())
        .map_err(|e| RepairError::io("cannot open input", path, e))?;

    let root = h5::with_library(|| {
        let file = h5::File::open(path).at("")?;
        let root = file.root().at("")?;
        read_group(&root, "")
    })
    .map_err(|e| RepairError::format(path, e.to_string()))?;

    debug!(
        path = %path.display(),
        bytes = meta.len(),
        root_children = root.len(),
        "read container"
    );
    Ok(Container::new(root))
}

fn refuse(path: &str, what: &str) -> NodeError {
    NodeError {
        at: path.to_string(),
        source: H5Error::Unsupported(what.to_string()),
    }
}

fn read_group(group: &h5::Group, path: &str) -> ReadResult<Group> {
    let mut out = Group::new();
    out.attrs = read_attrs(&group.attrs().at(path)?, path)?;

    for name in group.member_names().at(path)? {
        let child_path = format!("{path}/{name}");
        let node = match group.open(&name).at(&child_path)? {
            Member::Group(g) => Node::Group(read_group(&g, &child_path)?),
            Member::Dataset(d) => Node::Dataset(read_dataset(&d, &child_path)?),
            Member::Other => return Err(refuse(&child_path, "not a group or dataset")),
        };
        out.insert(name, node)
            .map_err(|_| refuse(&child_path, "duplicate link name"))?;
    }
    Ok(out)
}

fn read_dataset(ds: &h5::Dataset, path: &str) -> ReadResult<Dataset> {
    let payload = read_payload(ds).at(path)?;
    let attrs = read_attrs(&ds.attrs().at(path)?, path)?;
    Ok(Dataset { payload, attrs })
}

fn read_attrs(attrs: &h5::Attrs<'_>, path: &str) -> ReadResult<Attributes> {
    let mut out = Attributes::new();
    for name in attrs.names().at(path)? {
        let value = attrs
            .open(&name)
            .and_then(|attr| read_attr(&attr))
            .at(&attr_location(path, &name))?;
        out.set(name, value);
    }
    Ok(out)
}

fn shape_of(array: &impl Array) -> H5Result<Vec<u64>> {
    array
        .space()?
        .shape()?
        .ok_or_else(|| H5Error::Unsupported("null dataspace".into()))
}

fn read_payload(ds: &h5::Dataset) -> H5Result<Payload> {
    let dtype = ds.dtype()?;
    let shape = shape_of(ds)?;
    match dtype.layout()? {
        Layout::Numeric(elem) => {
            let mem = h5::Datatype::numeric(elem)?;
            Ok(Payload::Numeric(TypedArray::new(elem, shape, ds.read_bytes(&mem)?)))
        }
        Layout::VariableText => Err(H5Error::Unsupported(
            "variable-length string datasets cannot be copied".into(),
        )),
        Layout::FixedText { .. } | Layout::Raw => Ok(Payload::Opaque(raw(ds, &dtype, shape)?)),
    }
}

fn read_attr(attr: &h5::Attribute) -> H5Result<AttrValue> {
    let dtype = attr.dtype()?;
    let shape = shape_of(attr)?;
    let text_shaped = shape.len() <= 1;

    match dtype.layout()? {
        Layout::Numeric(elem) => {
            let mem = h5::Datatype::numeric(elem)?;
            Ok(AttrValue::Numeric(TypedArray::new(elem, shape, attr.read_bytes(&mem)?)))
        }
        Layout::FixedText { size, pad } if text_shaped => {
            let data = attr.read_bytes(&dtype)?;
            let items: Option<Vec<String>> = data
                .chunks(size.max(1))
                .map(|cell| String::from_utf8(unpad(cell, pad).to_vec()).ok())
                .collect();
            match items {
                Some(items) => Ok(text(items, &shape, TextStorage::Fixed)),
                None => Ok(AttrValue::Opaque(RawArray {
                    dtype: RawType::Encoded(dtype.encode()?),
                    shape,
                    data,
                })),
            }
        }
        Layout::VariableText if text_shaped => {
            let cells = attr.read_var_strings(&dtype)?;
            let items: Option<Vec<String>> = cells
                .iter()
                .map(|b| String::from_utf8(b.clone()).ok())
                .collect();
            match items {
                Some(items) => Ok(text(items, &shape, TextStorage::Variable)),
                None => Ok(AttrValue::Opaque(pack_fixed(&cells, shape)?)),
            }
        }
        Layout::VariableText => Err(H5Error::Unsupported(format!(
            "variable-length strings of rank {}",
            shape.len()
        ))),
        Layout::FixedText { .. } | Layout::Raw => Ok(AttrValue::Opaque(raw(attr, &dtype, shape)?)),
    }
}

fn raw(array: &impl Array, dtype: &h5::Datatype, shape: Vec<u64>) -> H5Result<RawArray> {
    Ok(RawArray {
        dtype: RawType::Encoded(dtype.encode()?),
        shape,
        data: array.read_bytes(dtype)?,
    })
}

fn unpad(cell: &[u8], pad: StrPad) -> &[u8] {
    match pad {
        StrPad::NulTerm => cell.split(|&b| b == 0).next().unwrap_or(cell),
        StrPad::NulPad => trim_end(cell, 0),
        StrPad::SpacePad => trim_end(cell, b' '),
    }
}

fn trim_end(cell: &[u8], fill: u8) -> &[u8] {
    let end = cell.iter().rposition(|&b| b != fill).map_or(0, |i| i + 1);
    &cell[..end]
}

fn text(items: Vec<String>, shape: &[u64], storage: TextStorage) -> AttrValue {
    if shape.is_empty() {
        AttrValue::Text {
            value: items.into_iter().next().unwrap_or_default(),
            storage,
        }
    } else {
        AttrValue::TextList { items, storage }
    }
}

/// Variable-length strings that are not UTF-8, re-laid as fixed-length cells
/// so the bytes can be carried without pointers.
fn pack_fixed(cells: &[Vec<u8>], shape: Vec<u64>) -> H5Result<RawArray> {
    let size = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut data = Vec::with_capacity(size * cells.len());
    for cell in cells {
        data.extend_from_slice(cell);
        data.resize(data.len() + size - cell.len(), 0);
    }
    Ok(RawArray {
        dtype: RawType::Encoded(h5::Datatype::fixed_string(size)?.encode()?),
        shape,
        data,
    })
}
