//! Verification processor (§4.9, component C8b): compare archived metadata
//! against either the live filesystem (`verify_against_filesystem`) or the
//! archive's own recorded CRC32/size (`test`), per entry.

use std::path::{Path, PathBuf};

use crate::crc::crc32_of;
use crate::error::{ArchiveError, Result};
use crate::link_record::{FileLinkType, LinkRecord, UNKNOWN_I16, UNKNOWN_I32};
use crate::os_capability::OsCapability;
use crate::storage::Storage;
use crate::traverser::Processor;

fn append_error(record: &mut LinkRecord, message: String) {
    record.verification_error = Some(match record.verification_error.take() {
        Some(existing) => format!("{existing}; {message}"),
        None => message,
    });
}

#[derive(Debug, Clone)]
pub struct VerifyEntry {
    pub archive_path: String,
    pub record: LinkRecord,
}

/// Checks each visited entry's recorded metadata against a reference. Two
/// modes, selected by whether `filesystem_root` is set:
/// - `Some(dir)`: compare against files under `dir` (§4.9
///   `verify_against_filesystem`).
/// - `None`: recompute each file's CRC32 from its own archived bytes and
///   compare against the recorded value (§4.9 `test`, archive-internal
///   consistency check, no filesystem involved).
pub struct VerifyProcessor<'s> {
    storage: &'s dyn Storage,
    os: Option<&'s dyn OsCapability>,
    filesystem_root: Option<PathBuf>,
    archive_root: String,
    /// §4.8 step 6: compare mtime/permissions/link-type/uid/gid against the
    /// filesystem. On by default; off for callers that only care about
    /// content (size/CRC32).
    verify_attributes: bool,
    pub results: Vec<VerifyEntry>,
}

impl<'s> VerifyProcessor<'s> {
    pub fn against_filesystem(storage: &'s dyn Storage, os: &'s dyn OsCapability, archive_root: impl Into<String>, filesystem_root: impl Into<PathBuf>) -> Self {
        VerifyProcessor {
            storage,
            os: Some(os),
            filesystem_root: Some(filesystem_root.into()),
            archive_root: archive_root.into(),
            verify_attributes: true,
            results: Vec::new(),
        }
    }

    pub fn self_test(storage: &'s dyn Storage, archive_root: impl Into<String>) -> Self {
        VerifyProcessor { storage, os: None, filesystem_root: None, archive_root: archive_root.into(), verify_attributes: true, results: Vec::new() }
    }

    pub fn with_verify_attributes(mut self, enabled: bool) -> Self {
        self.verify_attributes = enabled;
        self
    }

    fn map_path(&self, archive_path: &str) -> Option<PathBuf> {
        let root = self.filesystem_root.as_ref()?;
        let relative = archive_path.strip_prefix(&self.archive_root).unwrap_or(archive_path).trim_start_matches('/');
        Some(if relative.is_empty() { root.clone() } else { root.join(relative) })
    }

    /// §4.8 step 6: permissions and ownership have no dedicated `status()`
    /// category, so mismatches are folded into `verification_error`.
    /// mtime and link-type are left to `status()`'s own derived checks,
    /// via `verified_last_modified`/`verified_type` set by the caller.
    fn compare_attributes(&self, record: &mut LinkRecord, meta: &crate::os_capability::UnixMetadata) {
        if record.permissions != UNKNOWN_I16 {
            if let Some(mode) = meta.mode {
                let fs_perms = (mode & 0o7777) as i16;
                if fs_perms != record.permissions {
                    append_error(record, format!("permissions differ: archive={:o} fs={:o}", record.permissions, fs_perms));
                }
            }
        }
        if record.uid != UNKNOWN_I32 && record.uid != meta.uid as i32 {
            append_error(record, format!("uid differs: archive={} fs={}", record.uid, meta.uid));
        }
        if record.gid != UNKNOWN_I32 && record.gid != meta.gid as i32 {
            append_error(record, format!("gid differs: archive={} fs={}", record.gid, meta.gid));
        }
    }
}

impl Processor for VerifyProcessor<'_> {
    fn on_entry(&mut self, archive_path: &str, record: &LinkRecord) -> Result<()> {
        let mut record = record.clone();

        if let Some(os) = self.os {
            let fs_path = self.map_path(archive_path).expect("filesystem_root is set");
            match fs::symlink_metadata_kind(&fs_path) {
                Ok(kind) => {
                    record.verified_type = Some(kind);
                    if kind == FileLinkType::RegularFile {
                        let bytes = std::fs::read(&fs_path).map_err(|e| ArchiveError::io("read for verify", e))?;
                        record.verified_size = bytes.len() as i64;
                        record.verified_crc32 = Some(crc32_of(&bytes));
                    } else if kind == FileLinkType::Symlink {
                        // §4.8 step 3: unconditional, regardless of verify_attributes.
                        match std::fs::read_link(&fs_path) {
                            Ok(target) => {
                                let target = target.to_string_lossy().into_owned();
                                if record.link_target.as_deref() != Some(target.as_str()) {
                                    let msg = format!("symlink target differs: archive={:?} fs={target:?}", record.link_target);
                                    append_error(&mut record, msg);
                                }
                            }
                            Err(e) => append_error(&mut record, format!("readlink failed: {e}")),
                        }
                    }
                    if self.verify_attributes {
                        let meta = os.read_metadata(&fs_path)?;
                        record.verified_last_modified = meta.mtime_secs;
                        self.compare_attributes(&mut record, &meta);
                    }
                }
                Err(_) => {
                    append_error(&mut record, format!("{} missing from filesystem", fs_path.display()));
                }
            }
        } else if record.is_regular_file() {
            let bytes = self.storage.read_bytes(archive_path).unwrap_or_default();
            record.verified_type = Some(record.link_type);
            record.verified_size = bytes.len() as i64;
            record.verified_crc32 = Some(crc32_of(&bytes));
            record.verified_last_modified = record.last_modified;
        }

        self.results.push(VerifyEntry { archive_path: archive_path.to_string(), record });
        Ok(())
    }
}

mod fs {
    use super::*;

    pub fn symlink_metadata_kind(path: &Path) -> std::io::Result<FileLinkType> {
        let meta = std::fs::symlink_metadata(path)?;
        let ft = meta.file_type();
        Ok(if ft.is_symlink() {
            FileLinkType::Symlink
        } else if ft.is_dir() {
            FileLinkType::Directory
        } else {
            FileLinkType::RegularFile
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailFast;
    use crate::index_provider::IndexProvider;
    use crate::os_capability::UnixOs;
    use crate::storage::memory::MemoryStorage;
    use crate::traverser::Traverser;

    #[test]
    fn self_test_flags_mismatched_crc() {
        let storage = MemoryStorage::new();
        storage.write_bytes("/f", b"hi\n", false).unwrap();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        let mut record = LinkRecord::new("f", FileLinkType::RegularFile);
        record.size = 3;
        record.crc32 = 0xDEADBEEFu32 as i32;
        record.has_crc32 = true;
        index_provider.get(&storage, "/", false, &FailFast).unwrap().lock().unwrap().update(record);

        let traverser = Traverser::new(&storage, &index_provider, &FailFast);
        let mut verify = VerifyProcessor::self_test(&storage, "/");
        traverser.walk("/", &LinkRecord::new("", FileLinkType::Directory), &mut verify).unwrap();

        let entry = verify.results.iter().find(|e| e.archive_path == "/f").unwrap();
        assert_eq!(entry.record.status(false), "WRONG CRC32");
    }

    #[test]
    fn verify_against_filesystem_detects_missing_file() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        index_provider
            .get(&storage, "/", false, &FailFast)
            .unwrap()
            .lock()
            .unwrap()
            .update(LinkRecord::new("gone.txt", FileLinkType::RegularFile));

        let dir = tempfile::tempdir().unwrap();
        let os = UnixOs;
        let traverser = Traverser::new(&storage, &index_provider, &FailFast);
        let mut verify = VerifyProcessor::against_filesystem(&storage, &os, "/", dir.path());
        traverser.walk("/", &LinkRecord::new("", FileLinkType::Directory), &mut verify).unwrap();

        let entry = verify.results.iter().find(|e| e.archive_path == "/gone.txt").unwrap();
        assert!(entry.record.verification_error.is_some());
    }
}
