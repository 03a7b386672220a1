//! Owned handles over the HDF5 C library.
//!
//! Every identifier lives in a [`Handle`] and is closed on drop. Calls are
//! serialized through the binding's library lock (see [`with_library`]) and
//! automatic error printing is switched off: a failed call is turned into an
//! [`H5Error`] carrying the innermost message from the library error stack.
//!
//! Only what the reader and writer need is wrapped:
//! - files, opened read-only or created with creation order tracking
//! - groups and their links, listed in creation order when the file kept it
//! - attributes and datasets as [`Array`]s of raw bytes or text
//! - datatypes and dataspaces

use crate::container::node::ElementType;
use hdf5_sys::h5::{
    H5_INDEX_CRT_ORDER, H5_INDEX_NAME, H5_ITER_INC, H5_index_t, H5free_memory, H5open, herr_t,
    hsize_t,
};
use hdf5_sys::h5a::{
    H5A_info_t, H5A_operator2_t, H5Aclose, H5Acreate2, H5Aget_space, H5Aget_type, H5Aiterate2,
    H5Aopen, H5Aread, H5Awrite,
};
use hdf5_sys::h5d::{
    H5Dclose, H5Dcreate2, H5Dget_create_plist, H5Dget_space, H5Dget_type, H5Dread, H5Dwrite,
};
use hdf5_sys::h5e::{
    H5E_DEFAULT, H5E_WALK_DOWNWARD, H5E_error2_t, H5E_walk2_t, H5Eclear2, H5Eset_auto2, H5Ewalk2,
};
use hdf5_sys::h5f::{H5F_ACC_RDONLY, H5F_ACC_TRUNC, H5Fclose, H5Fcreate, H5Fopen};
use hdf5_sys::h5g::{H5G_info_t, H5Gclose, H5Gcreate2, H5Gget_create_plist, H5Gget_info, H5Gopen2};
use hdf5_sys::h5i::{H5I_DATASET, H5I_GROUP, H5Iget_type, hid_t};
use hdf5_sys::h5l::{H5Lexists, H5Lget_name_by_idx};
use hdf5_sys::h5o::{H5Oclose, H5Oopen};
use hdf5_sys::h5p::{
    H5P_CLS_DATASET_CREATE, H5P_CLS_FILE_CREATE, H5P_CLS_GROUP_CREATE, H5P_CRT_ORDER_INDEXED,
    H5P_CRT_ORDER_TRACKED, H5P_DEFAULT, H5Pclose, H5Pcreate, H5Pget_attr_creation_order,
    H5Pget_link_creation_order, H5Pset_attr_creation_order, H5Pset_link_creation_order,
    H5Pset_obj_track_times,
};
use hdf5_sys::h5s::{
    H5S_ALL, H5S_NULL, H5S_SCALAR, H5S_SIMPLE, H5Sclose, H5Screate, H5Screate_simple,
    H5Sget_simple_extent_dims, H5Sget_simple_extent_ndims, H5Sget_simple_extent_npoints,
    H5Sget_simple_extent_type,
};
use hdf5_sys::h5t::{
    H5T_ARRAY, H5T_COMPOUND, H5T_CSET_UTF8, H5T_C_S1, H5T_FLOAT, H5T_IEEE_F32LE, H5T_IEEE_F64LE,
    H5T_INTEGER, H5T_OPAQUE, H5T_REFERENCE, H5T_SGN_2, H5T_STD_I8LE, H5T_STD_I16LE, H5T_STD_I32LE,
    H5T_STD_I64LE, H5T_STD_U8LE, H5T_STD_U16LE, H5T_STD_U32LE, H5T_STD_U64LE, H5T_STR_NULLPAD,
    H5T_STR_NULLTERM, H5T_STR_SPACEPAD, H5T_STRING, H5T_VARIABLE, H5T_VLEN, H5Tclose, H5Tcopy,
    H5Tcreate, H5Tdecode, H5Tencode, H5Tget_class, H5Tget_member_type, H5Tget_nmembers,
    H5Tget_sign, H5Tget_size, H5Tget_strpad, H5Tget_super, H5Tis_variable_str, H5Tset_cset,
    H5Tset_size, H5Tset_strpad, H5Tset_tag,
};
use std::ffi::{CStr, CString, c_char, c_int, c_uint, c_void};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr;

pub(crate) type H5Result<T> = std::result::Result<T, H5Error>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum H5Error {
    #[error("{call} failed: {detail}")]
    Call { call: &'static str, detail: String },

    /// A link with this name is already present in the target group.
    #[error("'{0}' already exists")]
    Exists(String),

    #[error("'{0}' is not a valid link name")]
    InvalidName(String),

    #[error("{0}")]
    Unsupported(String),
}

impl H5Error {
    /// Drain the library error stack into an error for `call`.
    fn from_stack(call: &'static str) -> Self {
        let mut detail = String::new();
        let walk: H5E_walk2_t = Some(innermost_message);
        unsafe {
            H5Ewalk2(
                H5E_DEFAULT,
                H5E_WALK_DOWNWARD,
                walk,
                (&mut detail as *mut String).cast(),
            );
            H5Eclear2(H5E_DEFAULT);
        }
        if detail.is_empty() {
            detail.push_str("no message on the HDF5 error stack");
        }
        H5Error::Call { call, detail }
    }
}

unsafe extern "C" fn innermost_message(
    n: c_uint,
    err: *const H5E_error2_t,
    data: *mut c_void,
) -> herr_t {
    if n == 0 && !err.is_null() {
        // SAFETY: `data` is the `String` handed to `H5Ewalk2` in `from_stack`.
        let out = unsafe { &mut *data.cast::<String>() };
        let desc = unsafe { (*err).desc };
        if !desc.is_null() {
            *out = unsafe { CStr::from_ptr(desc) }.to_string_lossy().into_owned();
        }
    }
    0
}

/// An [`H5Error`] tagged with the container path it happened at.
#[derive(Debug, thiserror::Error)]
#[error("{at}: {source}")]
pub(crate) struct NodeError {
    pub at: String,
    #[source]
    pub source: H5Error,
}

pub(crate) trait At<T> {
    fn at(self, path: &str) -> std::result::Result<T, NodeError>;
}

impl<T> At<T> for H5Result<T> {
    fn at(self, path: &str) -> std::result::Result<T, NodeError> {
        self.map_err(|source| NodeError {
            at: if path.is_empty() { "/".to_string() } else { path.to_string() },
            source,
        })
    }
}

/// Location of an attribute for error messages.
pub(crate) fn attr_location(path: &str, name: &str) -> String {
    let owner = if path.is_empty() { "/" } else { path };
    format!("attribute '{name}' of {owner}")
}

fn check(ret: herr_t, call: &'static str) -> H5Result<()> {
    if ret < 0 { Err(H5Error::from_stack(call)) } else { Ok(()) }
}

fn cstring(s: &str) -> H5Result<CString> {
    CString::new(s).map_err(|_| H5Error::Unsupported(format!("{s:?} contains a NUL byte")))
}

/// Run `f` holding the library lock, with the library initialized and its
/// error printing silenced.
pub(crate) fn with_library<T>(f: impl FnOnce() -> T) -> T {
    let _lock = hdf5_sys::LOCK.lock();
    unsafe {
        H5open();
        H5Eset_auto2(H5E_DEFAULT, None, ptr::null_mut());
    }
    f()
}

type CloseFn = unsafe extern "C" fn(hid_t) -> herr_t;

struct Handle {
    id: hid_t,
    close: CloseFn,
}

impl Handle {
    fn new(id: hid_t, close: CloseFn, call: &'static str) -> H5Result<Self> {
        if id < 0 {
            Err(H5Error::from_stack(call))
        } else {
            Ok(Self { id, close })
        }
    }

    /// Close now and report the result instead of leaving it to drop.
    fn close(self) -> H5Result<()> {
        let this = std::mem::ManuallyDrop::new(self);
        check(unsafe { (this.close)(this.id) }, "close")
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            (self.close)(self.id);
        }
    }
}

/// Creation property list with creation order tracked and indexed, and no
/// object timestamps. Links are ordered too when `links` is set.
fn creation_plist(class: hid_t, links: bool) -> H5Result<Handle> {
    let plist = Handle::new(unsafe { H5Pcreate(class) }, H5Pclose, "H5Pcreate")?;
    let order = H5P_CRT_ORDER_TRACKED | H5P_CRT_ORDER_INDEXED;
    check(unsafe { H5Pset_obj_track_times(plist.id, 0) }, "H5Pset_obj_track_times")?;
    check(
        unsafe { H5Pset_attr_creation_order(plist.id, order) },
        "H5Pset_attr_creation_order",
    )?;
    if links {
        check(
            unsafe { H5Pset_link_creation_order(plist.id, order) },
            "H5Pset_link_creation_order",
        )?;
    }
    Ok(plist)
}

fn index_for(flags: c_uint) -> H5_index_t {
    if flags & H5P_CRT_ORDER_INDEXED != 0 {
        H5_INDEX_CRT_ORDER
    } else {
        H5_INDEX_NAME
    }
}

pub(crate) struct File(Handle);

impl File {
    pub fn open(path: &Path) -> H5Result<Self> {
        let name = path_cstring(path)?;
        let id = unsafe { H5Fopen(name.as_ptr(), H5F_ACC_RDONLY, H5P_DEFAULT) };
        Handle::new(id, H5Fclose, "H5Fopen").map(File)
    }

    /// Create `path`, truncating whatever is there.
    pub fn create(path: &Path) -> H5Result<Self> {
        let name = path_cstring(path)?;
        let fcpl = creation_plist(*H5P_CLS_FILE_CREATE, true)?;
        let id = unsafe { H5Fcreate(name.as_ptr(), H5F_ACC_TRUNC, fcpl.id, H5P_DEFAULT) };
        Handle::new(id, H5Fclose, "H5Fcreate").map(File)
    }

    pub fn root(&self) -> H5Result<Group> {
        let id = unsafe { H5Gopen2(self.0.id, c"/".as_ptr(), H5P_DEFAULT) };
        Handle::new(id, H5Gclose, "H5Gopen2").map(Group)
    }

    /// Flush and close. Objects opened from the file must be dropped first.
    pub fn close(self) -> H5Result<()> {
        self.0.close()
    }
}

fn path_cstring(path: &Path) -> H5Result<CString> {
    let s = path.to_str().ok_or_else(|| {
        H5Error::Unsupported(format!("{} is not a UTF-8 path", path.display()))
    })?;
    cstring(s)
}

pub(crate) struct Group(Handle);

pub(crate) struct Dataset(Handle);

pub(crate) struct Attribute(Handle);

pub(crate) enum Member {
    Group(Group),
    Dataset(Dataset),
    /// Committed datatypes and anything else a link may point at.
    Other,
}

impl Group {
    /// Link names in creation order if the group indexes it, else by name.
    pub fn member_names(&self) -> H5Result<Vec<String>> {
        let mut info = H5G_info_t::default();
        check(unsafe { H5Gget_info(self.0.id, &mut info) }, "H5Gget_info")?;

        let plist = Handle::new(
            unsafe { H5Gget_create_plist(self.0.id) },
            H5Pclose,
            "H5Gget_create_plist",
        )?;
        let mut flags: c_uint = 0;
        check(
            unsafe { H5Pget_link_creation_order(plist.id, &mut flags) },
            "H5Pget_link_creation_order",
        )?;
        let index = index_for(flags);

        (0..info.nlinks)
            .map(|n| link_name(self.0.id, index, n))
            .collect()
    }

    pub fn open(&self, name: &str) -> H5Result<Member> {
        let cname = cstring(name)?;
        let id = unsafe { H5Oopen(self.0.id, cname.as_ptr(), H5P_DEFAULT) };
        let handle = Handle::new(id, H5Oclose, "H5Oopen")?;
        Ok(match unsafe { H5Iget_type(handle.id) } {
            H5I_GROUP => Member::Group(Group(handle)),
            H5I_DATASET => Member::Dataset(Dataset(handle)),
            _ => Member::Other,
        })
    }

    pub fn create_group(&self, name: &str) -> H5Result<Group> {
        let cname = self.free_link(name)?;
        let gcpl = creation_plist(*H5P_CLS_GROUP_CREATE, true)?;
        let id = unsafe {
            H5Gcreate2(self.0.id, cname.as_ptr(), H5P_DEFAULT, gcpl.id, H5P_DEFAULT)
        };
        Handle::new(id, H5Gclose, "H5Gcreate2").map(Group)
    }

    pub fn create_dataset(
        &self,
        name: &str,
        dtype: &Datatype,
        space: &Dataspace,
    ) -> H5Result<Dataset> {
        let cname = self.free_link(name)?;
        let dcpl = creation_plist(*H5P_CLS_DATASET_CREATE, false)?;
        let id = unsafe {
            H5Dcreate2(
                self.0.id,
                cname.as_ptr(),
                dtype.0.id,
                space.0.id,
                H5P_DEFAULT,
                dcpl.id,
                H5P_DEFAULT,
            )
        };
        Handle::new(id, H5Dclose, "H5Dcreate2").map(Dataset)
    }

    /// Check that `name` can be linked into this group as a new member.
    fn free_link(&self, name: &str) -> H5Result<CString> {
        if name.is_empty() || name == "." || name.contains('/') {
            return Err(H5Error::InvalidName(name.to_string()));
        }
        let cname = cstring(name)?;
        match unsafe { H5Lexists(self.0.id, cname.as_ptr(), H5P_DEFAULT) } {
            0 => Ok(cname),
            n if n > 0 => Err(H5Error::Exists(name.to_string())),
            _ => Err(H5Error::from_stack("H5Lexists")),
        }
    }

    pub fn attrs(&self) -> H5Result<Attrs<'_>> {
        let plist = Handle::new(
            unsafe { H5Gget_create_plist(self.0.id) },
            H5Pclose,
            "H5Gget_create_plist",
        )?;
        Attrs::new(self.0.id, &plist)
    }
}

fn link_name(group: hid_t, index: H5_index_t, n: hsize_t) -> H5Result<String> {
    let here = c".";
    let len = unsafe {
        H5Lget_name_by_idx(
            group,
            here.as_ptr(),
            index,
            H5_ITER_INC,
            n,
            ptr::null_mut(),
            0,
            H5P_DEFAULT,
        )
    };
    if len < 0 {
        return Err(H5Error::from_stack("H5Lget_name_by_idx"));
    }
    let mut buf = vec![0u8; len as usize + 1];
    let len = unsafe {
        H5Lget_name_by_idx(
            group,
            here.as_ptr(),
            index,
            H5_ITER_INC,
            n,
            buf.as_mut_ptr().cast(),
            buf.len(),
            H5P_DEFAULT,
        )
    };
    if len < 0 {
        return Err(H5Error::from_stack("H5Lget_name_by_idx"));
    }
    buf.truncate(len as usize);
    String::from_utf8(buf)
        .map_err(|e| H5Error::Unsupported(format!("link name {:?} is not UTF-8", e.as_bytes())))
}

impl Dataset {
    pub fn attrs(&self) -> H5Result<Attrs<'_>> {
        let plist = Handle::new(
            unsafe { H5Dget_create_plist(self.0.id) },
            H5Pclose,
            "H5Dget_create_plist",
        )?;
        Attrs::new(self.0.id, &plist)
    }
}

/// Attribute table of a group or dataset.
pub(crate) struct Attrs<'a> {
    owner: hid_t,
    index: H5_index_t,
    _owner: PhantomData<&'a ()>,
}

impl Attrs<'_> {
    fn new(owner: hid_t, create_plist: &Handle) -> H5Result<Self> {
        let mut flags: c_uint = 0;
        check(
            unsafe { H5Pget_attr_creation_order(create_plist.id, &mut flags) },
            "H5Pget_attr_creation_order",
        )?;
        Ok(Self {
            owner,
            index: index_for(flags),
            _owner: PhantomData,
        })
    }

    /// Attribute names in creation order if the owner indexes it, else by name.
    pub fn names(&self) -> H5Result<Vec<String>> {
        let mut names: Vec<Vec<u8>> = Vec::new();
        let mut idx: hsize_t = 0;
        let op: H5A_operator2_t = Some(collect_attr_name);
        let ret = unsafe {
            H5Aiterate2(
                self.owner,
                self.index,
                H5_ITER_INC,
                &mut idx,
                op,
                (&mut names as *mut Vec<Vec<u8>>).cast(),
            )
        };
        check(ret, "H5Aiterate2")?;
        names
            .into_iter()
            .map(|b| {
                String::from_utf8(b).map_err(|e| {
                    H5Error::Unsupported(format!(
                        "attribute name {:?} is not UTF-8",
                        e.as_bytes()
                    ))
                })
            })
            .collect()
    }

    pub fn open(&self, name: &str) -> H5Result<Attribute> {
        let cname = cstring(name)?;
        let id = unsafe { H5Aopen(self.owner, cname.as_ptr(), H5P_DEFAULT) };
        Handle::new(id, H5Aclose, "H5Aopen").map(Attribute)
    }

    pub fn create(&self, name: &str, dtype: &Datatype, space: &Dataspace) -> H5Result<Attribute> {
        let cname = cstring(name)?;
        let id = unsafe {
            H5Acreate2(
                self.owner,
                cname.as_ptr(),
                dtype.0.id,
                space.0.id,
                H5P_DEFAULT,
                H5P_DEFAULT,
            )
        };
        Handle::new(id, H5Aclose, "H5Acreate2").map(Attribute)
    }
}

unsafe extern "C" fn collect_attr_name(
    _owner: hid_t,
    name: *const c_char,
    _info: *const H5A_info_t,
    data: *mut c_void,
) -> herr_t {
    // SAFETY: `data` is the `Vec` handed to `H5Aiterate2` in `Attrs::names`.
    let names = unsafe { &mut *data.cast::<Vec<Vec<u8>>>() };
    names.push(unsafe { CStr::from_ptr(name) }.to_bytes().to_vec());
    0
}

/// Typed element storage: an attribute or a dataset.
pub(crate) trait Array {
    fn dtype(&self) -> H5Result<Datatype>;

    fn space(&self) -> H5Result<Dataspace>;

    /// # Safety
    /// `buf` must have room for every element in the layout of `mem`.
    unsafe fn read_raw(&self, mem: &Datatype, buf: *mut c_void) -> herr_t;

    /// # Safety
    /// `buf` must hold every element in the layout of `mem`.
    unsafe fn write_raw(&self, mem: &Datatype, buf: *const c_void) -> herr_t;

    /// Read every element converted to `mem`, which must be a fixed-size type.
    fn read_bytes(&self, mem: &Datatype) -> H5Result<Vec<u8>> {
        let len = self.space()?.npoints()? * mem.size();
        let mut buf = vec![0u8; len];
        check(unsafe { self.read_raw(mem, buf.as_mut_ptr().cast()) }, "read")?;
        Ok(buf)
    }

    fn write_bytes(&self, mem: &Datatype, data: &[u8]) -> H5Result<()> {
        let expected = self.space()?.npoints()? * mem.size();
        if data.len() != expected {
            return Err(H5Error::Unsupported(format!(
                "payload is {} bytes, the dataspace needs {expected}",
                data.len()
            )));
        }
        check(unsafe { self.write_raw(mem, data.as_ptr().cast()) }, "write")
    }

    /// Read variable-length strings as raw bytes. A null element reads as
    /// empty.
    fn read_var_strings(&self, mem: &Datatype) -> H5Result<Vec<Vec<u8>>> {
        let n = self.space()?.npoints()?;
        let mut ptrs: Vec<*mut c_char> = vec![ptr::null_mut(); n];
        check(unsafe { self.read_raw(mem, ptrs.as_mut_ptr().cast()) }, "read")?;
        let items = ptrs
            .iter()
            .map(|&p| {
                if p.is_null() {
                    Vec::new()
                } else {
                    unsafe { CStr::from_ptr(p) }.to_bytes().to_vec()
                }
            })
            .collect();
        for p in ptrs.into_iter().filter(|p| !p.is_null()) {
            unsafe {
                H5free_memory(p.cast());
            }
        }
        Ok(items)
    }

    fn write_var_strings(&self, mem: &Datatype, items: &[String]) -> H5Result<()> {
        let expected = self.space()?.npoints()?;
        if items.len() != expected {
            return Err(H5Error::Unsupported(format!(
                "{} strings for a dataspace of {expected}",
                items.len()
            )));
        }
        let owned = items
            .iter()
            .map(|s| cstring(s))
            .collect::<H5Result<Vec<_>>>()?;
        let ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        check(unsafe { self.write_raw(mem, ptrs.as_ptr().cast()) }, "write")
    }
}

impl Array for Attribute {
    fn dtype(&self) -> H5Result<Datatype> {
        Handle::new(unsafe { H5Aget_type(self.0.id) }, H5Tclose, "H5Aget_type").map(Datatype)
    }

    fn space(&self) -> H5Result<Dataspace> {
        Handle::new(unsafe { H5Aget_space(self.0.id) }, H5Sclose, "H5Aget_space").map(Dataspace)
    }

    unsafe fn read_raw(&self, mem: &Datatype, buf: *mut c_void) -> herr_t {
        unsafe { H5Aread(self.0.id, mem.0.id, buf) }
    }

    unsafe fn write_raw(&self, mem: &Datatype, buf: *const c_void) -> herr_t {
        unsafe { H5Awrite(self.0.id, mem.0.id, buf) }
    }
}

impl Array for Dataset {
    fn dtype(&self) -> H5Result<Datatype> {
        Handle::new(unsafe { H5Dget_type(self.0.id) }, H5Tclose, "H5Dget_type").map(Datatype)
    }

    fn space(&self) -> H5Result<Dataspace> {
        Handle::new(unsafe { H5Dget_space(self.0.id) }, H5Sclose, "H5Dget_space").map(Dataspace)
    }

    unsafe fn read_raw(&self, mem: &Datatype, buf: *mut c_void) -> herr_t {
        unsafe { H5Dread(self.0.id, mem.0.id, H5S_ALL, H5S_ALL, H5P_DEFAULT, buf) }
    }

    unsafe fn write_raw(&self, mem: &Datatype, buf: *const c_void) -> herr_t {
        unsafe { H5Dwrite(self.0.id, mem.0.id, H5S_ALL, H5S_ALL, H5P_DEFAULT, buf) }
    }
}

/// Padding of a fixed-length string type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StrPad {
    NulTerm,
    NulPad,
    SpacePad,
}

/// How the reader should take a datatype apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    Numeric(ElementType),
    FixedText { size: usize, pad: StrPad },
    VariableText,
    /// Fixed-size elements with no pointers inside, copied as bytes.
    Raw,
}

pub(crate) struct Datatype(Handle);

impl Datatype {
    fn copy_of(id: hid_t) -> H5Result<Self> {
        Handle::new(unsafe { H5Tcopy(id) }, H5Tclose, "H5Tcopy").map(Datatype)
    }

    /// Little-endian file type for a numeric element type.
    pub fn numeric(dtype: ElementType) -> H5Result<Self> {
        let base = match dtype {
            ElementType::I8 => *H5T_STD_I8LE,
            ElementType::I16 => *H5T_STD_I16LE,
            ElementType::I32 => *H5T_STD_I32LE,
            ElementType::I64 => *H5T_STD_I64LE,
            ElementType::U8 => *H5T_STD_U8LE,
            ElementType::U16 => *H5T_STD_U16LE,
            ElementType::U32 => *H5T_STD_U32LE,
            ElementType::U64 => *H5T_STD_U64LE,
            ElementType::F32 => *H5T_IEEE_F32LE,
            ElementType::F64 => *H5T_IEEE_F64LE,
        };
        Self::copy_of(base)
    }

    /// Variable-length UTF-8 string, as h5py writes `str`.
    pub fn variable_string() -> H5Result<Self> {
        let t = Self::copy_of(*H5T_C_S1)?;
        check(unsafe { H5Tset_size(t.0.id, H5T_VARIABLE) }, "H5Tset_size")?;
        check(unsafe { H5Tset_cset(t.0.id, H5T_CSET_UTF8) }, "H5Tset_cset")?;
        Ok(t)
    }

    /// NUL-padded ASCII string of `size` bytes, as h5py writes `bytes`.
    pub fn fixed_string(size: usize) -> H5Result<Self> {
        let t = Self::copy_of(*H5T_C_S1)?;
        check(unsafe { H5Tset_size(t.0.id, size.max(1)) }, "H5Tset_size")?;
        check(unsafe { H5Tset_strpad(t.0.id, H5T_STR_NULLPAD) }, "H5Tset_strpad")?;
        Ok(t)
    }

    /// One-byte opaque type for untyped payloads.
    pub fn raw_bytes() -> H5Result<Self> {
        let t = Handle::new(unsafe { H5Tcreate(H5T_OPAQUE, 1) }, H5Tclose, "H5Tcreate")
            .map(Datatype)?;
        check(unsafe { H5Tset_tag(t.0.id, c"raw bytes".as_ptr()) }, "H5Tset_tag")?;
        Ok(t)
    }

    /// Rebuild a type serialized by [`Datatype::encode`].
    pub fn decode(bytes: &[u8]) -> H5Result<Self> {
        if bytes.is_empty() {
            return Err(H5Error::Unsupported("empty datatype encoding".into()));
        }
        let id = unsafe { H5Tdecode(bytes.as_ptr().cast()) };
        Handle::new(id, H5Tclose, "H5Tdecode").map(Datatype)
    }

    pub fn encode(&self) -> H5Result<Vec<u8>> {
        let mut len: usize = 0;
        check(
            unsafe { H5Tencode(self.0.id, ptr::null_mut(), &mut len) },
            "H5Tencode",
        )?;
        let mut buf = vec![0u8; len];
        check(
            unsafe { H5Tencode(self.0.id, buf.as_mut_ptr().cast(), &mut len) },
            "H5Tencode",
        )?;
        Ok(buf)
    }

    pub fn size(&self) -> usize {
        unsafe { H5Tget_size(self.0.id) }
    }

    fn is_variable_str(&self) -> bool {
        unsafe { H5Tis_variable_str(self.0.id) > 0 }
    }

    fn member(&self, n: c_uint) -> H5Result<Datatype> {
        let id = unsafe { H5Tget_member_type(self.0.id, n) };
        Handle::new(id, H5Tclose, "H5Tget_member_type").map(Datatype)
    }

    fn base(&self) -> H5Result<Datatype> {
        Handle::new(unsafe { H5Tget_super(self.0.id) }, H5Tclose, "H5Tget_super").map(Datatype)
    }

    /// True if elements hold heap pointers or object references, which do
    /// not survive a byte copy into another file.
    fn has_indirect_data(&self) -> H5Result<bool> {
        Ok(match unsafe { H5Tget_class(self.0.id) } {
            H5T_VLEN | H5T_REFERENCE => true,
            H5T_STRING => self.is_variable_str(),
            H5T_ARRAY => self.base()?.has_indirect_data()?,
            H5T_COMPOUND => {
                let n: c_int = unsafe { H5Tget_nmembers(self.0.id) };
                if n < 0 {
                    return Err(H5Error::from_stack("H5Tget_nmembers"));
                }
                for i in 0..n as c_uint {
                    if self.member(i)?.has_indirect_data()? {
                        return Ok(true);
                    }
                }
                false
            }
            _ => false,
        })
    }

    pub fn layout(&self) -> H5Result<Layout> {
        let size = self.size();
        Ok(match unsafe { H5Tget_class(self.0.id) } {
            H5T_INTEGER => {
                let signed = unsafe { H5Tget_sign(self.0.id) } == H5T_SGN_2;
                match (size, signed) {
                    (1, true) => Layout::Numeric(ElementType::I8),
                    (2, true) => Layout::Numeric(ElementType::I16),
                    (4, true) => Layout::Numeric(ElementType::I32),
                    (8, true) => Layout::Numeric(ElementType::I64),
                    (1, false) => Layout::Numeric(ElementType::U8),
                    (2, false) => Layout::Numeric(ElementType::U16),
                    (4, false) => Layout::Numeric(ElementType::U32),
                    (8, false) => Layout::Numeric(ElementType::U64),
                    _ => Layout::Raw,
                }
            }
            H5T_FLOAT => match size {
                4 => Layout::Numeric(ElementType::F32),
                8 => Layout::Numeric(ElementType::F64),
                _ => Layout::Raw,
            },
            H5T_STRING if self.is_variable_str() => Layout::VariableText,
            H5T_STRING => {
                let pad = match unsafe { H5Tget_strpad(self.0.id) } {
                    H5T_STR_NULLTERM => StrPad::NulTerm,
                    H5T_STR_SPACEPAD => StrPad::SpacePad,
                    _ => StrPad::NulPad,
                };
                Layout::FixedText { size, pad }
            }
            _ if self.has_indirect_data()? => {
                return Err(H5Error::Unsupported(
                    "variable-length and reference types cannot be copied".into(),
                ));
            }
            _ => Layout::Raw,
        })
    }
}

pub(crate) struct Dataspace(Handle);

impl Dataspace {
    /// Simple dataspace of `shape`, or a scalar one when `shape` is empty.
    pub fn new(shape: &[u64]) -> H5Result<Self> {
        let id = if shape.is_empty() {
            unsafe { H5Screate(H5S_SCALAR) }
        } else {
            let dims: Vec<hsize_t> = shape.iter().map(|&d| d as hsize_t).collect();
            unsafe { H5Screate_simple(dims.len() as c_int, dims.as_ptr(), ptr::null()) }
        };
        Handle::new(id, H5Sclose, "H5Screate").map(Dataspace)
    }

    /// `None` for a null dataspace, empty for a scalar.
    pub fn shape(&self) -> H5Result<Option<Vec<u64>>> {
        match unsafe { H5Sget_simple_extent_type(self.0.id) } {
            H5S_NULL => Ok(None),
            H5S_SCALAR => Ok(Some(Vec::new())),
            H5S_SIMPLE => {
                let rank = unsafe { H5Sget_simple_extent_ndims(self.0.id) };
                if rank < 0 {
                    return Err(H5Error::from_stack("H5Sget_simple_extent_ndims"));
                }
                let mut dims: Vec<hsize_t> = vec![0; rank as usize];
                let ret = unsafe {
                    H5Sget_simple_extent_dims(self.0.id, dims.as_mut_ptr(), ptr::null_mut())
                };
                if ret < 0 {
                    return Err(H5Error::from_stack("H5Sget_simple_extent_dims"));
                }
                Ok(Some(dims.into_iter().map(|d| d as u64).collect()))
            }
            _ => Err(H5Error::from_stack("H5Sget_simple_extent_type")),
        }
    }

    pub fn npoints(&self) -> H5Result<usize> {
        let n = unsafe { H5Sget_simple_extent_npoints(self.0.id) };
        if n < 0 {
            return Err(H5Error::from_stack("H5Sget_simple_extent_npoints"));
        }
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.h5");
        (dir, path)
    }

    #[test]
    fn creating_an_existing_group_reports_the_name() {
        let (_dir, path) = scratch();
        with_library(|| {
            let file = File::create(&path).unwrap();
            let root = file.root().unwrap();
            root.create_group("a_b").unwrap();
            match root.create_group("a_b") {
                Err(H5Error::Exists(name)) => assert_eq!(name, "a_b"),
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("second create succeeded"),
            }
        });
    }

    #[test]
    fn slash_is_not_a_link_name() {
        let (_dir, path) = scratch();
        with_library(|| {
            let file = File::create(&path).unwrap();
            let root = file.root().unwrap();
            assert!(matches!(root.create_group("a/b"), Err(H5Error::InvalidName(_))));
        });
    }

    #[test]
    fn members_and_attributes_keep_creation_order() {
        let (_dir, path) = scratch();
        with_library(|| {
            let file = File::create(&path).unwrap();
            let root = file.root().unwrap();
            for name in ["zeta", "alpha", "mid"] {
                root.create_group(name).unwrap();
            }
            let attrs = root.attrs().unwrap();
            let t = Datatype::numeric(ElementType::I32).unwrap();
            let s = Dataspace::new(&[]).unwrap();
            for name in ["z", "a"] {
                attrs.create(name, &t, &s).unwrap().write_bytes(&t, &[0; 4]).unwrap();
            }
            drop(attrs);
            drop(root);
            file.close().unwrap();

            let file = File::open(&path).unwrap();
            let root = file.root().unwrap();
            assert_eq!(root.member_names().unwrap(), vec!["zeta", "alpha", "mid"]);
            assert_eq!(root.attrs().unwrap().names().unwrap(), vec!["z", "a"]);
        });
    }

    #[test]
    fn variable_strings_round_trip() {
        let (_dir, path) = scratch();
        with_library(|| {
            let file = File::create(&path).unwrap();
            let root = file.root().unwrap();
            let t = Datatype::variable_string().unwrap();
            let s = Dataspace::new(&[2]).unwrap();
            let items = vec!["dense".to_string(), "naïve".to_string()];
            let attr = root.attrs().unwrap().create("names", &t, &s).unwrap();
            attr.write_var_strings(&t, &items).unwrap();

            let back = attr.read_var_strings(&attr.dtype().unwrap()).unwrap();
            assert_eq!(back, vec![b"dense".to_vec(), "naïve".as_bytes().to_vec()]);
            assert_eq!(attr.dtype().unwrap().layout().unwrap(), Layout::VariableText);
        });
    }

    #[test]
    fn short_payload_is_refused_before_writing() {
        let (_dir, path) = scratch();
        with_library(|| {
            let file = File::create(&path).unwrap();
            let root = file.root().unwrap();
            let t = Datatype::numeric(ElementType::F32).unwrap();
            let s = Dataspace::new(&[3]).unwrap();
            let ds = root.create_dataset("x", &t, &s).unwrap();
            assert!(matches!(ds.write_bytes(&t, &[0; 8]), Err(H5Error::Unsupported(_))));
        });
    }

    #[test]
    fn encoded_types_decode_to_the_same_layout() {
        with_library(|| {
            let t = Datatype::fixed_string(7).unwrap();
            let back = Datatype::decode(&t.encode().unwrap()).unwrap();
            assert_eq!(
                back.layout().unwrap(),
                Layout::FixedText { size: 7, pad: StrPad::NulPad }
            );
            assert_eq!(Datatype::raw_bytes().unwrap().layout().unwrap(), Layout::Raw);
        });
    }

    #[test]
    fn opening_a_non_hdf5_file_fails_with_a_message() {
        let (_dir, path) = scratch();
        std::fs::write(&path, b"\x89HDF\r\n\x1a\n not really").unwrap();
        with_library(|| match File::open(&path) {
            Err(H5Error::Call { call, detail }) => {
                assert_eq!(call, "H5Fopen");
                assert!(!detail.is_empty());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("garbage opened as HDF5"),
        });
    }
}
