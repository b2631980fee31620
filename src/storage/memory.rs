//! In-process [`Storage`] implementation backed by a flat map of
//! normalized paths to nodes. Grounded on the sibling pack example
//! `chiro2001-rfs`'s `disk_driver::memory::MemoryDiskDriver`, which plays
//! the same "fully functional, non-persistent storage provider" role for
//! that project's own storage trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::{ArchiveError, Result};
use crate::path_util;
use crate::storage::{GroupMember, LinkInfo, LinkKind, Storage, StorageFeature};

#[derive(Debug, Clone)]
enum Node {
    Group,
    Dataset(Dataset),
    SoftLink(String),
}

#[derive(Debug, Clone)]
struct Dataset {
    bytes: Vec<u8>,
    chunked: bool,
    #[allow(dead_code)]
    tag: String,
    attributes: HashMap<String, i32>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    closed: bool,
}

/// A complete in-memory HDF5-container stand-in: groups, soft links, and
/// opaque/plain datasets addressed by normalized archive path.
#[derive(Debug)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    read_only: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Group);
        MemoryStorage { inner: Mutex::new(Inner { nodes, closed: false }), read_only: false }
    }

    pub fn new_read_only() -> Self {
        let storage = Self::new();
        MemoryStorage { inner: storage.inner, read_only: true }
    }

    fn guard_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(ArchiveError::ReadOnly);
        }
        Ok(())
    }

    fn not_found(path: &str) -> ArchiveError {
        ArchiveError::NotFound { path: path.to_string() }
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        let path = path_util::normalize(path);
        Ok(self.inner.lock().unwrap().nodes.contains_key(&path))
    }

    fn is_group(&self, path: &str) -> Result<bool> {
        let path = path_util::normalize(path);
        Ok(matches!(self.inner.lock().unwrap().nodes.get(&path), Some(Node::Group)))
    }

    fn is_dataset(&self, path: &str) -> Result<bool> {
        let path = path_util::normalize(path);
        Ok(matches!(self.inner.lock().unwrap().nodes.get(&path), Some(Node::Dataset(_))))
    }

    fn get_link_info(&self, path: &str) -> Result<LinkInfo> {
        let path = path_util::normalize(path);
        let inner = self.inner.lock().unwrap();
        Ok(match inner.nodes.get(&path) {
            Some(Node::Group) => LinkInfo { kind: LinkKind::Group, target: None, exists: true },
            Some(Node::Dataset(_)) => LinkInfo { kind: LinkKind::Dataset, target: None, exists: true },
            Some(Node::SoftLink(target)) => {
                let resolved = inner.nodes.contains_key(target);
                LinkInfo { kind: LinkKind::SoftLink, target: Some(target.clone()), exists: resolved }
            }
            None => LinkInfo { kind: LinkKind::Other, target: None, exists: false },
        })
    }

    fn get_group_members(&self, path: &str) -> Result<Vec<GroupMember>> {
        let path = path_util::normalize(path);
        let inner = self.inner.lock().unwrap();
        if !matches!(inner.nodes.get(&path), Some(Node::Group)) {
            return Err(Self::not_found(&path));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let mut members = Vec::new();
        for (candidate, node) in inner.nodes.iter() {
            if candidate == &path {
                continue;
            }
            if let Some(rest) = candidate.strip_prefix(&prefix) {
                if rest.is_empty() || rest.contains('/') {
                    continue;
                }
                let info = match node {
                    Node::Group => LinkInfo { kind: LinkKind::Group, target: None, exists: true },
                    Node::Dataset(_) => LinkInfo { kind: LinkKind::Dataset, target: None, exists: true },
                    Node::SoftLink(target) => LinkInfo {
                        kind: LinkKind::SoftLink,
                        target: Some(target.clone()),
                        exists: inner.nodes.contains_key(target),
                    },
                };
                members.push(GroupMember { name: rest.to_string(), info });
            }
        }
        Ok(members)
    }

    fn get_dataset_size(&self, path: &str) -> Result<u64> {
        let path = path_util::normalize(path);
        match self.inner.lock().unwrap().nodes.get(&path) {
            Some(Node::Dataset(data)) => Ok(data.bytes.len() as u64),
            _ => Err(Self::not_found(&path)),
        }
    }

    fn create_group(&self, path: &str, _size_hint: Option<usize>) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        self.inner.lock().unwrap().nodes.insert(path, Node::Group);
        Ok(())
    }

    fn create_soft_link(&self, target: &str, path: &str) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        let target = path_util::normalize(target);
        self.inner.lock().unwrap().nodes.insert(path, Node::SoftLink(target));
        Ok(())
    }

    fn read_soft_link_target(&self, path: &str) -> Result<Option<String>> {
        let path = path_util::normalize(path);
        match self.inner.lock().unwrap().nodes.get(&path) {
            Some(Node::SoftLink(target)) => Ok(Some(target.clone())),
            _ => Ok(None),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        let mut inner = self.inner.lock().unwrap();
        let prefix = format!("{path}/");
        let descendants: Vec<String> =
            inner.nodes.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        for d in descendants {
            inner.nodes.remove(&d);
        }
        if inner.nodes.remove(&path).is_none() {
            return Err(Self::not_found(&path));
        }
        Ok(())
    }

    fn write_bytes(&self, path: &str, bytes: &[u8], _deflate: bool) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        let mut inner = self.inner.lock().unwrap();
        let attributes = match inner.nodes.get(&path) {
            Some(Node::Dataset(existing)) => existing.attributes.clone(),
            _ => HashMap::new(),
        };
        inner.nodes.insert(
            path,
            Node::Dataset(Dataset { bytes: bytes.to_vec(), chunked: false, tag: String::new(), attributes }),
        );
        Ok(())
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let path = path_util::normalize(path);
        match self.inner.lock().unwrap().nodes.get(&path) {
            Some(Node::Dataset(data)) => Ok(data.bytes.clone()),
            _ => Err(Self::not_found(&path)),
        }
    }

    fn set_i32_attribute(&self, path: &str, name: &str, value: i32) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        let mut inner = self.inner.lock().unwrap();
        match inner.nodes.get_mut(&path) {
            Some(Node::Dataset(data)) => {
                data.attributes.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(Self::not_found(&path)),
        }
    }

    fn get_i32_attribute(&self, path: &str, name: &str) -> Result<Option<i32>> {
        let path = path_util::normalize(path);
        match self.inner.lock().unwrap().nodes.get(&path) {
            Some(Node::Dataset(data)) => Ok(data.attributes.get(name).copied()),
            _ => Err(Self::not_found(&path)),
        }
    }

    fn create_opaque(&self, path: &str, tag: &str, length: u64, _feature: StorageFeature) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        self.inner.lock().unwrap().nodes.insert(
            path,
            Node::Dataset(Dataset {
                bytes: vec![0u8; length as usize],
                chunked: false,
                tag: tag.to_string(),
                attributes: HashMap::new(),
            }),
        );
        Ok(())
    }

    fn create_chunked_opaque(
        &self,
        path: &str,
        tag: &str,
        initial: u64,
        _chunk_size: u64,
        _feature: StorageFeature,
    ) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        self.inner.lock().unwrap().nodes.insert(
            path,
            Node::Dataset(Dataset {
                bytes: vec![0u8; initial as usize],
                chunked: true,
                tag: tag.to_string(),
                attributes: HashMap::new(),
            }),
        );
        Ok(())
    }

    fn write_block(&self, path: &str, buf: &[u8], offset: u64) -> Result<()> {
        self.guard_writable()?;
        let path = path_util::normalize(path);
        let mut inner = self.inner.lock().unwrap();
        match inner.nodes.get_mut(&path) {
            Some(Node::Dataset(data)) => {
                let end = offset as usize + buf.len();
                if end > data.bytes.len() {
                    if !data.chunked {
                        return Err(ArchiveError::storage("write_block", "contiguous dataset write out of bounds"));
                    }
                    data.bytes.resize(end, 0);
                }
                data.bytes[offset as usize..end].copy_from_slice(buf);
                Ok(())
            }
            _ => Err(Self::not_found(&path)),
        }
    }

    fn read_block(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        let path = path_util::normalize(path);
        match self.inner.lock().unwrap().nodes.get(&path) {
            Some(Node::Dataset(data)) => {
                let offset = offset as usize;
                if offset >= data.bytes.len() {
                    return Ok(0);
                }
                let n = buf.len().min(data.bytes.len() - offset);
                buf[..n].copy_from_slice(&data.bytes[offset..offset + n]);
                Ok(n)
            }
            _ => Err(Self::not_found(&path)),
        }
    }

    fn is_chunked(&self, path: &str) -> Result<bool> {
        let path = path_util::normalize(path);
        match self.inner.lock().unwrap().nodes.get(&path) {
            Some(Node::Dataset(data)) => Ok(data.chunked),
            _ => Err(Self::not_found(&path)),
        }
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
