//! In-memory container tree.
//!
//! Children and attributes are kept as ordered vectors rather than maps: the
//! order a file lists them in is carried into the copy.

/// Numeric element type of a dataset payload or numeric attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }
}

/// Typed array payload: element type, shape and little-endian element bytes.
///
/// An empty shape is a scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    pub dtype: ElementType,
    pub shape: Vec<u64>,
    pub data: Vec<u8>,
}

impl TypedArray {
    pub fn new(dtype: ElementType, shape: Vec<u64>, data: Vec<u8>) -> Self {
        Self { dtype, shape, data }
    }

    pub fn from_i64s(values: &[i64]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(ElementType::I64, vec![values.len() as u64], data)
    }

    pub fn from_f32s(shape: Vec<u64>, values: &[f32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(ElementType::F32, shape, data)
    }

    pub fn scalar_f64(value: f64) -> Self {
        Self::new(ElementType::F64, Vec::new(), value.to_le_bytes().to_vec())
    }

    pub fn element_count(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
    }

    /// Check that the payload is exactly what dtype and shape describe.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let expected = self
            .element_count()
            .and_then(|n| n.checked_mul(self.dtype.size() as u64))
            .ok_or_else(|| format!("shape {:?} overflows", self.shape))?;
        if expected != self.data.len() as u64 {
            return Err(format!(
                "payload is {} bytes, shape {:?} of {:?} needs {}",
                self.data.len(),
                self.shape,
                self.dtype,
                expected
            ));
        }
        Ok(())
    }
}

/// Element type of a [`RawArray`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawType {
    /// Datatype in the serialized form HDF5 produces for it, taken from the
    /// source file: half floats, enums, compounds, odd-sized integers.
    Encoded(Vec<u8>),
    /// Untyped bytes, one per element.
    Bytes,
}

/// Payload of a type the tool does not interpret, carried byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArray {
    pub dtype: RawType,
    pub shape: Vec<u64>,
    pub data: Vec<u8>,
}

impl RawArray {
    /// One-dimensional untyped bytes.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            dtype: RawType::Bytes,
            shape: vec![data.len() as u64],
            data,
        }
    }
}

/// On-disk string type of a text attribute. A rewrite keeps it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextStorage {
    /// Variable-length UTF-8, what h5py writes for `str`.
    #[default]
    Variable,
    /// Fixed-length NUL-padded bytes, what h5py writes for `bytes` and numpy
    /// `S` arrays such as `layer_names`.
    Fixed,
}

/// Attribute value attached to a group or dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text { value: String, storage: TextStorage },
    TextList { items: Vec<String>, storage: TextStorage },
    Numeric(TypedArray),
    /// Everything else: raw bytes, types without a numeric mapping, and text
    /// whose bytes are not valid UTF-8.
    Opaque(RawArray),
}

impl AttrValue {
    pub fn text(s: impl Into<String>) -> Self {
        AttrValue::Text {
            value: s.into(),
            storage: TextStorage::Variable,
        }
    }

    pub fn fixed_text(s: impl Into<String>) -> Self {
        AttrValue::Text {
            value: s.into(),
            storage: TextStorage::Fixed,
        }
    }

    pub fn text_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::TextList {
            items: items.into_iter().map(Into::into).collect(),
            storage: TextStorage::Variable,
        }
    }

    pub fn fixed_text_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::TextList {
            items: items.into_iter().map(Into::into).collect(),
            storage: TextStorage::Fixed,
        }
    }

    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        AttrValue::Opaque(RawArray::bytes(bytes))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Ordered attribute table. Names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Insert or replace. A replaced value keeps its position.
    pub fn set(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Dataset contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Numeric(TypedArray),
    Opaque(RawArray),
}

impl From<TypedArray> for Payload {
    fn from(a: TypedArray) -> Self {
        Payload::Numeric(a)
    }
}

impl From<RawArray> for Payload {
    fn from(a: RawArray) -> Self {
        Payload::Opaque(a)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub payload: Payload,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            attrs: Attributes::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub attrs: Attributes,
    children: Vec<(String, Node)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|(k, _)| k == name).map(|(_, n)| n)
    }

    /// Append a child. Returns the node back if the name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, node: Node) -> std::result::Result<(), Node> {
        let name = name.into();
        if self.child(&name).is_some() {
            return Err(node);
        }
        self.children.push((name, node));
        Ok(())
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(k, n)| (k.as_str(), n))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn with_child(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        let name = name.into();
        if self.insert(name.clone(), node.into()).is_err() {
            panic!("duplicate child name {name:?}");
        }
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.set(name, value);
        self
    }
}

impl Dataset {
    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.set(name, value);
        self
    }
}

impl From<Group> for Node {
    fn from(g: Group) -> Self {
        Node::Group(g)
    }
}

impl From<Dataset> for Node {
    fn from(d: Dataset) -> Self {
        Node::Dataset(d)
    }
}

/// A whole container: the root group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    pub root: Group,
}

impl Container {
    pub fn new(root: Group) -> Self {
        Self { root }
    }

    /// Look up a node by `/`-separated path relative to the root.
    #[cfg(test)]
    pub(crate) fn lookup(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.root.child(first)?;
        for seg in segments {
            match node {
                Node::Group(g) => node = g.child(seg)?,
                Node::Dataset(_) => return None,
            }
        }
        Some(node)
    }
}
