//! Extraction processor (§4.9, component C8c): materialize archived
//! entries onto a real filesystem, restoring metadata per §6.2.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::config::ArchiveConfig;
use crate::crc::crc32_of;
use crate::error::{ArchiveError, Result};
use crate::link_record::{FileLinkType, LinkRecord, UNKNOWN_I16};
use crate::os_capability::{OsCapability, UnixMetadata};
use crate::storage::Storage;
use crate::traverser::Processor;

pub struct ExtractProcessor<'s> {
    storage: &'s dyn Storage,
    os: &'s dyn OsCapability,
    config: &'s ArchiveConfig,
    archive_root: String,
    target_dir: PathBuf,
    /// Directory records seen so far, so [`Self::on_directory_done`] can
    /// restore a directory's own mtime after its children were written.
    pending_directories: HashMap<String, LinkRecord>,
}

impl<'s> ExtractProcessor<'s> {
    pub fn new(
        storage: &'s dyn Storage,
        os: &'s dyn OsCapability,
        config: &'s ArchiveConfig,
        archive_root: impl Into<String>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        ExtractProcessor {
            storage,
            os,
            config,
            archive_root: archive_root.into(),
            target_dir: target_dir.into(),
            pending_directories: HashMap::new(),
        }
    }

    fn map_path(&self, archive_path: &str) -> PathBuf {
        let relative = archive_path.strip_prefix(&self.archive_root).unwrap_or(archive_path).trim_start_matches('/');
        if relative.is_empty() {
            self.target_dir.clone()
        } else {
            self.target_dir.join(relative)
        }
    }

    /// Whether the archiving strategy would still include this entry
    /// (§4.9 step 1: entries excluded by whitelist/blacklist are skipped
    /// rather than extracted).
    fn is_included(&self, archive_path: &str, link_type: FileLinkType) -> bool {
        match link_type {
            FileLinkType::Directory => self.config.is_directory_included(archive_path),
            FileLinkType::RegularFile | FileLinkType::Symlink | FileLinkType::Other => self.config.is_file_included(archive_path),
        }
    }

    fn record_metadata(record: &LinkRecord) -> UnixMetadata {
        UnixMetadata {
            uid: record.uid.max(0) as u32,
            gid: record.gid.max(0) as u32,
            mode: if record.permissions == UNKNOWN_I16 { None } else { Some((record.permissions as u32) & 0o7777) },
            mtime_secs: record.last_modified,
        }
    }

    fn restore(&self, path: &std::path::Path, record: &LinkRecord, link_type: FileLinkType) -> Result<()> {
        if record.last_modified == crate::link_record::UNKNOWN {
            return Ok(());
        }
        self.os.restore_metadata(path, &Self::record_metadata(record), link_type)
    }

    /// Write a regular file's bytes and restore its metadata, then re-read
    /// it from disk and compare size/CRC32 against the archived record
    /// (§4.9 step 5 "post-write re-verification").
    fn extract_regular_file(&self, archive_path: &str, fs_path: &std::path::Path, record: &LinkRecord) -> Result<()> {
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io("mkdir parent", e))?;
        }
        let bytes = self.storage.read_bytes(archive_path)?;
        fs::write(fs_path, &bytes).map_err(|e| ArchiveError::io("write file", e))?;
        self.restore(fs_path, record, FileLinkType::RegularFile)?;

        let reread = fs::read(fs_path).map_err(|e| ArchiveError::io("read back for verify", e))?;
        if reread.len() as i64 != record.size {
            return Err(ArchiveError::VerificationFailed {
                path: archive_path.to_string(),
                detail: format!("size differs after write: archive={} disk={}", record.size, reread.len()),
            });
        }
        if record.has_crc32 {
            let crc = crc32_of(&reread);
            if crc != record.crc32 as u32 {
                return Err(ArchiveError::VerificationFailed {
                    path: archive_path.to_string(),
                    detail: format!("crc32 differs after write: archive={:08x} disk={crc:08x}", record.crc32),
                });
            }
        }
        Ok(())
    }
}

impl Processor for ExtractProcessor<'_> {
    fn on_entry(&mut self, archive_path: &str, record: &LinkRecord) -> Result<()> {
        if !self.is_included(archive_path, record.link_type) {
            return Ok(());
        }
        let fs_path = self.map_path(archive_path);
        match record.link_type {
            FileLinkType::Directory => {
                fs::create_dir_all(&fs_path).map_err(|e| ArchiveError::io("mkdir", e))?;
                self.pending_directories.insert(archive_path.to_string(), record.clone());
            }
            FileLinkType::RegularFile => {
                self.extract_regular_file(archive_path, &fs_path, record)?;
            }
            FileLinkType::Symlink => {
                if self.os.supports_symlinks() {
                    let target = record.link_target.clone().ok_or_else(|| ArchiveError::MissingLinkTarget { path: archive_path.to_string() })?;
                    if let Some(parent) = fs_path.parent() {
                        fs::create_dir_all(parent).map_err(|e| ArchiveError::io("mkdir parent", e))?;
                    }
                    if fs_path.symlink_metadata().is_ok() {
                        fs::remove_file(&fs_path).map_err(|e| ArchiveError::io("remove existing", e))?;
                    }
                    std::os::unix::fs::symlink(&target, &fs_path).map_err(|e| ArchiveError::io("symlink", e))?;
                    self.restore(&fs_path, record, FileLinkType::Symlink)?;
                } else {
                    tracing::warn!(path = archive_path, "host does not support symlinks, extracting target path as a regular file");
                    let target = record.link_target.clone().ok_or_else(|| ArchiveError::MissingLinkTarget { path: archive_path.to_string() })?;
                    if let Some(parent) = fs_path.parent() {
                        fs::create_dir_all(parent).map_err(|e| ArchiveError::io("mkdir parent", e))?;
                    }
                    fs::write(&fs_path, target.as_bytes()).map_err(|e| ArchiveError::io("write file", e))?;
                }
            }
            FileLinkType::Other => {}
        }
        Ok(())
    }

    fn on_directory_done(&mut self, archive_path: &str) -> Result<()> {
        // Directory mtimes are restored here, after children are written,
        // since writing a child bumps the parent's mtime right back up.
        if let Some(record) = self.pending_directories.remove(archive_path) {
            let fs_path = self.map_path(archive_path);
            self.restore(&fs_path, &record, FileLinkType::Directory)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailFast;
    use crate::index_provider::IndexProvider;
    use crate::os_capability::NullOs;
    use crate::storage::memory::MemoryStorage;
    use crate::traverser::Traverser;
    use std::path::Path;

    #[test]
    fn extracts_file_and_directory_tree() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        storage.create_group("/d", None).unwrap();
        storage.write_bytes("/d/f.txt", b"hi\n", false).unwrap();
        {
            let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
            root.lock().unwrap().update(LinkRecord::new("d", FileLinkType::Directory));
        }
        {
            let d = index_provider.get(&storage, "/d", false, &FailFast).unwrap();
            let mut r = LinkRecord::new("f.txt", FileLinkType::RegularFile);
            r.size = 3;
            d.lock().unwrap().update(r);
        }

        let out = tempfile::tempdir().unwrap();
        let os = NullOs;
        let config = ArchiveConfig::default();
        let traverser = Traverser::new(&storage, &index_provider, &FailFast);
        let mut extract = ExtractProcessor::new(&storage, &os, &config, "/", out.path());
        traverser.walk("/", &LinkRecord::new("", FileLinkType::Directory), &mut extract).unwrap();

        let content = fs::read(out.path().join("d/f.txt")).unwrap();
        assert_eq!(content, b"hi\n");
    }

    #[test]
    fn extracts_symlink_verbatim() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        let mut r = LinkRecord::new("link", FileLinkType::Symlink);
        r.link_target = Some("/somewhere".to_string());
        index_provider.get(&storage, "/", false, &FailFast).unwrap().lock().unwrap().update(r);

        let out = tempfile::tempdir().unwrap();
        let os = NullOs;
        let config = ArchiveConfig::default();
        let traverser = Traverser::new(&storage, &index_provider, &FailFast);
        let mut extract = ExtractProcessor::new(&storage, &os, &config, "/", out.path());
        traverser.walk("/", &LinkRecord::new("", FileLinkType::Directory), &mut extract).unwrap();

        let target = fs::read_link(out.path().join("link")).unwrap();
        assert_eq!(target, Path::new("/somewhere"));
    }
}
