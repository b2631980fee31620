//! Archiving (write) side: turning filesystem entries into archive entries
//! (§4.5, component C5).
//!
//! Grounded on the teacher's `write_task.rs` for the streaming-vs-one-shot
//! split and `examples/shadow_fs/fs/utils.rs::metadata_to_attr` for the
//! metadata capture this mirrors in reverse.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::{ArchiveConfig, FormatVersion};
use crate::error::{ArchiveError, ErrorStrategy, Result};
use crate::index_provider::IndexProvider;
use crate::link_record::{FileLinkType, LinkRecord, UNKNOWN_I16};
use crate::os_capability::OsCapability;
use crate::path_util;
use crate::storage::{Storage, StorageFeature};
use crate::stream_writer::StreamingWriter;

/// A directory with more than this many entries gets its group
/// pre-created with a size hint (§4.5 "Directory archiving" rule 1).
const SIZE_HINT_ENTRY_THRESHOLD: usize = 100;

/// After the immediate parent's record (already updated by the caller) is
/// in place, walk every further ancestor up to the root, refreshing each
/// ancestor's own record in *its* parent — unless `immediate_group_only`
/// is set, in which case this is a no-op (§4.5 "Propagation").
///
/// `leaf_parent_path` is the archive path whose own record the caller
/// just updated (e.g. `/a/b/c` after updating `d`'s record there);
/// `leaf_parent_fs_dir` is the filesystem directory that mirrors it.
/// Propagated records carry only name/uid/gid/mtime/permissions — size,
/// crc32, and link_target stay at `LinkRecord::new`'s defaults, per spec.
pub(crate) fn propagate_ancestors(
    storage: &dyn Storage,
    index_provider: &IndexProvider,
    os: &dyn OsCapability,
    error_strategy: &dyn ErrorStrategy,
    immediate_group_only: bool,
    leaf_parent_path: &str,
    leaf_parent_fs_dir: Option<&Path>,
) -> Result<()> {
    if immediate_group_only {
        return Ok(());
    }
    let Some(mut fs_dir) = leaf_parent_fs_dir.map(Path::to_path_buf) else {
        return Ok(());
    };
    let mut archive_dir = leaf_parent_path.to_string();
    loop {
        let Some((grandparent_path, name)) = path_util::split(&archive_dir) else {
            break;
        };
        let meta = os.read_metadata(&fs_dir)?;
        let mut record = LinkRecord::new(name, FileLinkType::Directory);
        record.uid = meta.uid as i32;
        record.gid = meta.gid as i32;
        record.permissions = meta.mode.map(|m| (m & 0o7777) as i16).unwrap_or(UNKNOWN_I16);
        record.last_modified = meta.mtime_secs;

        let grandparent = index_provider.get(storage, &grandparent_path, false, error_strategy)?;
        grandparent.lock().unwrap().update(record);

        archive_dir = grandparent_path;
        fs_dir = match fs_dir.parent() {
            Some(p) => p.to_path_buf(),
            None => break,
        };
    }
    Ok(())
}

pub struct ArchiveUpdater<'s> {
    storage: &'s dyn Storage,
    index_provider: &'s IndexProvider,
    os: &'s dyn OsCapability,
    config: &'s ArchiveConfig,
    error_strategy: &'s dyn ErrorStrategy,
}

impl<'s> ArchiveUpdater<'s> {
    pub fn new(
        storage: &'s dyn Storage,
        index_provider: &'s IndexProvider,
        os: &'s dyn OsCapability,
        config: &'s ArchiveConfig,
        error_strategy: &'s dyn ErrorStrategy,
    ) -> Self {
        ArchiveUpdater { storage, index_provider, os, config, error_strategy }
    }

    fn storage_feature(&self, archive_path: &str) -> StorageFeature {
        if self.config.should_compress(archive_path) {
            StorageFeature::GenericDeflate
        } else {
            StorageFeature::GenericNoCompression
        }
    }

    fn record_base(&self, link_name: &str, link_type: FileLinkType, fs_path: &Path) -> Result<LinkRecord> {
        let meta = self.os.read_metadata(fs_path)?;
        let mut record = LinkRecord::new(link_name, link_type);
        record.uid = meta.uid as i32;
        record.gid = meta.gid as i32;
        record.permissions = meta.mode.map(|m| (m & 0o7777) as i16).unwrap_or(UNKNOWN_I16);
        record.last_modified = meta.mtime_secs;
        Ok(record)
    }

    /// §4.5 "Directory archiving" rule 1: pre-create the group with a size
    /// hint (sum of entry name lengths × 5) when this directory has more
    /// than 100 entries at the oldest supported format version, to reduce
    /// later rehashing in the storage provider's group structure.
    fn directory_size_hint(&self, fs_path: &Path) -> Option<usize> {
        if self.config.format_version != FormatVersion::V1 {
            return None;
        }
        let entries = fs::read_dir(fs_path).ok()?;
        let mut count = 0usize;
        let mut name_len_sum = 0usize;
        for entry in entries.flatten() {
            count += 1;
            name_len_sum += entry.file_name().len();
        }
        if count > SIZE_HINT_ENTRY_THRESHOLD {
            Some(name_len_sum * 5)
        } else {
            None
        }
    }

    /// Create (or overwrite) the group for `archive_path` and record it in
    /// its parent's index.
    pub fn archive_directory(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        let archive_path = path_util::normalize(archive_path);
        if !self.storage.exists(&archive_path)? {
            let size_hint = self.directory_size_hint(fs_path);
            self.storage.create_group(&archive_path, size_hint)?;
        }
        let Some((parent_path, name)) = path_util::split(&archive_path) else {
            return Ok(());
        };
        let record = self.record_base(name, FileLinkType::Directory, fs_path)?;
        let parent = self.index_provider.get(self.storage, &parent_path, false, self.error_strategy)?;
        parent.lock().unwrap().update(record);
        propagate_ancestors(
            self.storage,
            self.index_provider,
            self.os,
            self.error_strategy,
            self.config.immediate_group_only,
            &parent_path,
            fs_path.parent(),
        )?;
        Ok(())
    }

    /// Create a soft link for `archive_path` pointing at the symlink's
    /// recorded target, verbatim (§4.5 "symlinks are stored, not
    /// followed, by the updater").
    pub fn archive_symlink(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        let archive_path = path_util::normalize(archive_path);
        let target = self.os.read_symlink_target(fs_path)?;
        if self.storage.exists(&archive_path)? {
            self.storage.delete(&archive_path)?;
        }
        self.storage.create_soft_link(&target, &archive_path)?;

        let Some((parent_path, name)) = path_util::split(&archive_path) else {
            return Err(ArchiveError::PathHasNoName { path: archive_path });
        };
        let mut record = self.record_base(name, FileLinkType::Symlink, fs_path)?;
        record.link_target = Some(target);
        let parent = self.index_provider.get(self.storage, &parent_path, true, self.error_strategy)?;
        parent.lock().unwrap().update(record);
        propagate_ancestors(
            self.storage,
            self.index_provider,
            self.os,
            self.error_strategy,
            self.config.immediate_group_only,
            &parent_path,
            fs_path.parent(),
        )?;
        Ok(())
    }

    /// Archive a regular file's content. Small files (at or below
    /// `small_file_threshold`, or whenever compression is disabled for this
    /// path) are written contiguously in one shot; larger files stream
    /// through a chunked dataset (§4.5).
    pub fn archive_file(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        let archive_path = path_util::normalize(archive_path);
        let meta = self.os.read_metadata(fs_path)?;
        let size = fs::metadata(fs_path).map_err(|e| ArchiveError::io("stat file", e))?.len();

        let Some((parent_path, name)) = path_util::split(&archive_path) else {
            return Err(ArchiveError::PathHasNoName { path: archive_path });
        };

        let feature = self.storage_feature(&archive_path);
        let use_contiguous = feature == StorageFeature::GenericNoCompression
            || size <= self.config.small_file_threshold as u64;

        let mut record = self.record_base(name, FileLinkType::RegularFile, fs_path)?;

        if self.storage.exists(&archive_path)? {
            self.storage.delete(&archive_path)?;
        }

        if use_contiguous {
            let mut buf = Vec::with_capacity(size as usize);
            fs::File::open(fs_path)
                .and_then(|mut f| f.read_to_end(&mut buf))
                .map_err(|e| ArchiveError::io("read file", e))?;
            let crc = crate::crc::crc32_of(&buf);
            self.storage.create_opaque(&archive_path, "FILE", buf.len() as u64, feature)?;
            self.storage.write_block(&archive_path, &buf, 0)?;
            record.size = buf.len() as i64;
            record.crc32 = crc as i32;
            record.has_crc32 = true;

            let parent = self.index_provider.get(self.storage, &parent_path, false, self.error_strategy)?;
            parent.lock().unwrap().update(record);
            propagate_ancestors(
                self.storage,
                self.index_provider,
                self.os,
                self.error_strategy,
                self.config.immediate_group_only,
                &parent_path,
                fs_path.parent(),
            )?;
        } else {
            self.storage.create_chunked_opaque(&archive_path, "FILE", 0, self.config.chunk_size, feature)?;
            record.size = 0;
            let parent = self.index_provider.get(self.storage, &parent_path, false, self.error_strategy)?;
            parent.lock().unwrap().update(record);

            let writer = StreamingWriter::new(
                self.storage,
                archive_path.clone(),
                name.to_string(),
                parent.clone(),
                self.index_provider,
                self.os,
                self.error_strategy,
                self.config.immediate_group_only,
                parent_path.clone(),
                fs_path.parent().map(PathBuf::from),
            );
            let mut file = fs::File::open(fs_path).map_err(|e| ArchiveError::io("open file", e))?;
            let mut buf = vec![0u8; self.config.buffer_size];
            loop {
                let n = file.read(&mut buf).map_err(|e| ArchiveError::io("read file", e))?;
                if n == 0 {
                    break;
                }
                writer.write(&buf[..n])?;
            }
            writer.finish()?;
        }
        Ok(())
    }

    /// Dispatch on the filesystem entry's type (§4.5 entry point used by
    /// the facade's `archive_from_filesystem*` operations).
    pub fn archive_entry(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(fs_path).map_err(|e| ArchiveError::io("stat entry", e))?;
        if meta.file_type().is_symlink() {
            self.archive_symlink(archive_path, fs_path)
        } else if meta.is_dir() {
            self.archive_directory(archive_path, fs_path)
        } else {
            self.archive_file(archive_path, fs_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailFast;
    use crate::os_capability::NullOs;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn small_file_uses_contiguous_storage_and_records_crc() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        let os = NullOs;
        let config = ArchiveConfig::default();
        let updater = ArchiveUpdater::new(&storage, &index_provider, &os, &config, &FailFast);

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("hi.txt");
        fs::write(&file_path, b"hi\n").unwrap();

        updater.archive_file("/hi.txt", &file_path).unwrap();
        assert!(!storage.is_chunked("/hi.txt").unwrap());

        let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
        let record = root.lock().unwrap().try_get("hi.txt").cloned().unwrap();
        assert_eq!(record.size, 3);
        assert_eq!(record.crc32 as u32, 0x2C6E_0C59);
    }

    #[test]
    fn large_file_uses_chunked_streaming_path() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        let os = NullOs;
        let mut config = ArchiveConfig::default();
        config.small_file_threshold = 4;
        let updater = ArchiveUpdater::new(&storage, &index_provider, &os, &config, &FailFast);

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("big.bin");
        let content = vec![7u8; 100];
        fs::write(&file_path, &content).unwrap();

        updater.archive_file("/big.bin", &file_path).unwrap();
        assert!(storage.is_chunked("/big.bin").unwrap());

        let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
        let record = root.lock().unwrap().try_get("big.bin").cloned().unwrap();
        assert_eq!(record.size, 100);
        assert_eq!(record.crc32 as u32, crate::crc::crc32_of(&content));
    }

    #[test]
    fn archive_symlink_records_target() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        let os = crate::os_capability::UnixOs;
        let config = ArchiveConfig::default();
        let updater = ArchiveUpdater::new(&storage, &index_provider, &os, &config, &FailFast);

        let dir = tempfile::tempdir().unwrap();
        let link_path = dir.path().join("link");
        std::os::unix::fs::symlink("/target", &link_path).unwrap();

        updater.archive_symlink("/link", &link_path).unwrap();
        let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
        let record = root.lock().unwrap().try_get("link").cloned().unwrap();
        assert_eq!(record.link_target.as_deref(), Some("/target"));
    }
}
