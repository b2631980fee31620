//! Abstraction over the HDF5 capability set consumed by the archive core
//! (§6.1). This crate treats the actual HDF5 library as an external
//! collaborator — like the teacher treats the wire protocol it serves —
//! and depends only on this trait. [`memory::MemoryStorage`] is a
//! fully-functional in-process stand-in used by tests and grounded on the
//! sibling pack example `chiro2001-rfs`'s `disk_driver::memory` module,
//! which plays the identical role for that project's own storage trait.

pub mod memory;

use crate::error::Result;

/// One of the two compression tokens the storage provider understands, or
/// a request to skip chunking altogether (§6.1 "Storage features").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFeature {
    GenericDeflate,
    GenericNoCompression,
    GenericContiguous,
}

/// What kind of object a path names inside the storage container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Group,
    Dataset,
    SoftLink,
    Other,
}

/// Result of resolving a path's link metadata, without following soft
/// links (§6.1 `get_link_info`).
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub kind: LinkKind,
    pub target: Option<String>,
    pub exists: bool,
}

/// One entry returned by [`Storage::get_group_members`].
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub name: String,
    pub info: LinkInfo,
}

/// The HDF5 capability surface the archive core depends on. A production
/// implementation wraps a real HDF5 file handle; [`memory::MemoryStorage`]
/// wraps an in-memory node tree for tests.
///
/// All paths are normalized absolute archive paths (see [`crate::path_util`]).
pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;
    fn is_group(&self, path: &str) -> Result<bool>;
    fn is_dataset(&self, path: &str) -> Result<bool>;
    fn get_link_info(&self, path: &str) -> Result<LinkInfo>;
    fn get_group_members(&self, path: &str) -> Result<Vec<GroupMember>>;
    fn get_dataset_size(&self, path: &str) -> Result<u64>;

    fn create_group(&self, path: &str, size_hint: Option<usize>) -> Result<()>;
    fn create_soft_link(&self, target: &str, path: &str) -> Result<()>;
    fn read_soft_link_target(&self, path: &str) -> Result<Option<String>>;
    fn delete(&self, path: &str) -> Result<()>;

    /// Write a whole dataset's bytes in one shot (used for `INDEX`,
    /// `INDEXNAMES`, and small contiguous file content).
    fn write_bytes(&self, path: &str, bytes: &[u8], deflate: bool) -> Result<()>;
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;

    fn set_i32_attribute(&self, path: &str, name: &str, value: i32) -> Result<()>;
    fn get_i32_attribute(&self, path: &str, name: &str) -> Result<Option<i32>>;

    /// Create a fixed-size opaque dataset tagged `tag`, stored either
    /// contiguously or deflated per `feature` (§4.5 small-file path).
    fn create_opaque(&self, path: &str, tag: &str, length: u64, feature: StorageFeature) -> Result<()>;
    /// Create a chunked opaque dataset of initial size `initial`, growable
    /// in units of `chunk_size` (§4.5 streaming path).
    fn create_chunked_opaque(
        &self,
        path: &str,
        tag: &str,
        initial: u64,
        chunk_size: u64,
        feature: StorageFeature,
    ) -> Result<()>;
    fn write_block(&self, path: &str, buf: &[u8], offset: u64) -> Result<()>;
    fn read_block(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize>;
    /// True if `path`'s opaque dataset was created with chunk descriptors
    /// rather than stored contiguously (§8 boundary behavior).
    fn is_chunked(&self, path: &str) -> Result<bool>;

    fn flush(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn is_closed(&self) -> bool;
    fn is_read_only(&self) -> bool;
}
