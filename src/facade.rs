//! Single entry point tying every component together (§4.10, component
//! C9). Grounded on the teacher's `examples/shadow_fs/fs/shadow.rs`, which
//! plays the identical "one struct fronting path resolution, metadata
//! lookup, and read/write dispatch" role for its NFS server.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::ArchiveConfig;
use crate::deleter::ArchiveDeleter;
use crate::error::{fail_fast, ArchiveError, ErrorStrategy, Result};
use crate::index_provider::IndexProvider;
use crate::link_record::{FileLinkType, LinkRecord};
use crate::os_capability::OsCapability;
use crate::path_util;
use crate::processors::{ExtractProcessor, ListEntry, ListProcessor, VerifyProcessor};
use crate::storage::Storage;
use crate::traverser::{SymlinkResolver, TraverseOptions, Traverser};
use crate::updater::ArchiveUpdater;

pub use crate::processors::verify::VerifyEntry;

/// The archive's public API. Everything else in this crate is a detail
/// reachable only through here (or directly, by advanced callers who want
/// to compose components themselves).
pub struct ArchiveFacade<'s> {
    storage: &'s dyn Storage,
    os: &'s dyn OsCapability,
    config: ArchiveConfig,
    index_provider: IndexProvider,
    error_strategy: Arc<dyn ErrorStrategy>,
}

fn root_record() -> LinkRecord {
    LinkRecord::new(String::new(), FileLinkType::Directory)
}

impl<'s> ArchiveFacade<'s> {
    pub fn new(storage: &'s dyn Storage, os: &'s dyn OsCapability, config: ArchiveConfig) -> Self {
        let index_provider = IndexProvider::new(config.housekeeping_suffix.clone(), config.index_cache_capacity);
        ArchiveFacade { storage, os, config, index_provider, error_strategy: fail_fast() }
    }

    pub fn with_error_strategy(mut self, strategy: Arc<dyn ErrorStrategy>) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    fn updater(&self) -> ArchiveUpdater<'_> {
        ArchiveUpdater::new(self.storage, &self.index_provider, self.os, &self.config, self.error_strategy.as_ref())
    }

    fn deleter(&self) -> ArchiveDeleter<'_> {
        ArchiveDeleter::new(self.storage, &self.index_provider, self.error_strategy.as_ref())
    }

    fn traverser(&self) -> Traverser<'_> {
        Traverser::new(self.storage, &self.index_provider, self.error_strategy.as_ref()).with_resolver(self)
    }

    // -- Lookup -----------------------------------------------------------

    pub fn exists(&self, archive_path: &str) -> Result<bool> {
        self.storage.exists(&path_util::normalize(archive_path))
    }

    pub fn try_get_entry(&self, archive_path: &str) -> Result<Option<LinkRecord>> {
        let archive_path = path_util::normalize(archive_path);
        if archive_path == "/" {
            return Ok(Some(root_record()));
        }
        let Some((parent_path, name)) = path_util::split(&archive_path) else {
            return Ok(None);
        };
        if !self.storage.exists(&parent_path)? {
            return Ok(None);
        }
        let index = self.index_provider.get(self.storage, &parent_path, true, self.error_strategy.as_ref())?;
        let result = index.lock().unwrap().try_get(name).cloned();
        Ok(result)
    }

    pub fn is_directory(&self, archive_path: &str) -> Result<bool> {
        Ok(self.try_get_entry(archive_path)?.map(|r| r.is_directory()).unwrap_or(false))
    }

    pub fn is_regular_file(&self, archive_path: &str) -> Result<bool> {
        Ok(self.try_get_entry(archive_path)?.map(|r| r.is_regular_file()).unwrap_or(false))
    }

    pub fn is_symlink(&self, archive_path: &str) -> Result<bool> {
        Ok(self.try_get_entry(archive_path)?.map(|r| r.is_symlink()).unwrap_or(false))
    }

    /// Follow a chain of symlinks starting at `archive_path` (which need
    /// not itself be a symlink) until a non-symlink path is reached.
    /// Detects cycles and enforces `config.max_symlink_hops` (§4.6).
    pub fn try_resolve_link(&self, archive_path: &str) -> Result<String> {
        let mut current = path_util::normalize(archive_path);
        let mut visited = HashSet::new();
        for _ in 0..self.config.max_symlink_hops {
            let Some(record) = self.try_get_entry(&current)? else {
                return Ok(current);
            };
            if !record.is_symlink() {
                return Ok(current);
            }
            if !visited.insert(current.clone()) {
                return Err(ArchiveError::SymlinkCycle { path: current });
            }
            let target = record.link_target.ok_or(ArchiveError::MissingLinkTarget { path: current.clone() })?;
            let Some((parent, _)) = path_util::split(&current) else {
                return Err(ArchiveError::SymlinkCycle { path: current });
            };
            current = path_util::resolve_relative(&parent, &target);
        }
        Err(ArchiveError::SymlinkCycle { path: current })
    }

    pub fn try_get_resolved_entry(&self, archive_path: &str) -> Result<Option<LinkRecord>> {
        let resolved = self.try_resolve_link(archive_path)?;
        self.try_get_entry(&resolved)
    }

    // -- Read-side operations ----------------------------------------------

    /// List every entry at or beneath `archive_path`, directories-first,
    /// lexicographic within each directory (§4.8).
    pub fn list(&self, archive_path: &str) -> Result<Vec<ListEntry>> {
        self.list_with_options(archive_path, &TraverseOptions::default())
    }

    pub fn list_with_options(&self, archive_path: &str, options: &TraverseOptions) -> Result<Vec<ListEntry>> {
        let archive_path = path_util::normalize(archive_path);
        let record = self
            .try_get_entry(&archive_path)?
            .ok_or_else(|| ArchiveError::NotFound { path: archive_path.clone() })?;
        let mut processor = ListProcessor::new();
        self.traverser().walk_with(&archive_path, &record, &mut processor, options)?;
        Ok(processor.entries)
    }

    /// Recompute each archived file's CRC32 from its own stored bytes and
    /// compare against the recorded value (§4.9 internal consistency
    /// check, no filesystem involved).
    pub fn test(&self, archive_path: &str) -> Result<Vec<VerifyEntry>> {
        self.test_with_options(archive_path, &TraverseOptions::default())
    }

    pub fn test_with_options(&self, archive_path: &str, options: &TraverseOptions) -> Result<Vec<VerifyEntry>> {
        let archive_path = path_util::normalize(archive_path);
        let record = self
            .try_get_entry(&archive_path)?
            .ok_or_else(|| ArchiveError::NotFound { path: archive_path.clone() })?;
        let mut processor = VerifyProcessor::self_test(self.storage, archive_path.clone());
        self.traverser().walk_with(&archive_path, &record, &mut processor, options)?;
        Ok(processor.results)
    }

    /// Compare the archived subtree rooted at `archive_path` against the
    /// real files under `filesystem_root` (§4.9).
    pub fn verify_against_filesystem(&self, archive_path: &str, filesystem_root: &Path) -> Result<Vec<VerifyEntry>> {
        self.verify_against_filesystem_with_options(archive_path, filesystem_root, &TraverseOptions::default())
    }

    pub fn verify_against_filesystem_with_options(&self, archive_path: &str, filesystem_root: &Path, options: &TraverseOptions) -> Result<Vec<VerifyEntry>> {
        let archive_path = path_util::normalize(archive_path);
        let record = self
            .try_get_entry(&archive_path)?
            .ok_or_else(|| ArchiveError::NotFound { path: archive_path.clone() })?;
        let mut processor = VerifyProcessor::against_filesystem(self.storage, self.os, archive_path.clone(), filesystem_root);
        self.traverser().walk_with(&archive_path, &record, &mut processor, options)?;
        Ok(processor.results)
    }

    /// Materialize the archived subtree rooted at `archive_path` onto
    /// `filesystem_root`, restoring metadata per §6.2.
    pub fn extract_to_filesystem(&self, archive_path: &str, filesystem_root: &Path) -> Result<()> {
        self.extract_to_filesystem_with_options(archive_path, filesystem_root, &TraverseOptions::default())
    }

    pub fn extract_to_filesystem_with_options(&self, archive_path: &str, filesystem_root: &Path, options: &TraverseOptions) -> Result<()> {
        let archive_path = path_util::normalize(archive_path);
        let record = self
            .try_get_entry(&archive_path)?
            .ok_or_else(|| ArchiveError::NotFound { path: archive_path.clone() })?;
        let mut processor = ExtractProcessor::new(self.storage, self.os, &self.config, archive_path.clone(), filesystem_root);
        self.traverser().walk_with(&archive_path, &record, &mut processor, options)
    }

    // -- Write-side operations ----------------------------------------------

    pub fn archive_file(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        self.updater().archive_file(archive_path, fs_path)
    }

    pub fn archive_symlink(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        self.updater().archive_symlink(archive_path, fs_path)
    }

    pub fn archive_directory(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        self.updater().archive_directory(archive_path, fs_path)
    }

    /// Recursively archive `fs_path` (file, symlink, or directory tree)
    /// under `archive_path`, honoring the configured whitelist/blacklist
    /// (§4.5 `ArchivingStrategy`). Directories are always archived so the
    /// tree structure survives; the whitelist/blacklist gate applies to
    /// leaves (files and symlinks) only.
    pub fn archive_from_filesystem(&self, archive_path: &str, fs_path: &Path) -> Result<()> {
        let archive_path = path_util::normalize(archive_path);
        let updater = self.updater();
        let meta = fs::symlink_metadata(fs_path).map_err(|e| ArchiveError::io("stat entry", e))?;

        if meta.file_type().is_symlink() {
            if !self.config.is_file_included(&archive_path) {
                return Ok(());
            }
            return updater.archive_symlink(&archive_path, fs_path);
        }
        if !meta.is_dir() {
            if !self.config.is_file_included(&archive_path) {
                return Ok(());
            }
            return updater.archive_file(&archive_path, fs_path);
        }

        if !self.config.is_directory_included(&archive_path) {
            return Ok(());
        }
        updater.archive_directory(&archive_path, fs_path)?;
        let entries = fs::read_dir(fs_path).map_err(|e| ArchiveError::io("readdir", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io("readdir entry", e))?;
            let child_name = entry.file_name().to_string_lossy().into_owned();
            let child_archive_path = path_util::join(&archive_path, &child_name);
            match self.archive_from_filesystem(&child_archive_path, &entry.path()) {
                Ok(()) => {}
                Err(err) => {
                    self.error_strategy.handle(&child_archive_path, err)?;
                }
            }
        }
        Ok(())
    }

    pub fn delete(&self, archive_path: &str) -> Result<()> {
        self.deleter().delete(archive_path)
    }

    /// Flush and close every cached directory index (§4.3 "close").
    pub fn close(&self) -> Result<()> {
        self.index_provider.close_all(self.storage)
    }
}

impl SymlinkResolver for ArchiveFacade<'_> {
    /// Resolve `link_target` (relative to `archive_path`'s parent) to an
    /// archive directory path, if it names one. Reuses the same hop-limited
    /// chain resolver as every other symlink lookup in the facade, so
    /// following a symlink during a walk can never bypass the cycle guard.
    fn resolve_directory(&self, archive_path: &str, link_target: &str) -> Result<Option<String>> {
        let Some((parent, _)) = path_util::split(archive_path) else {
            return Ok(None);
        };
        let target = path_util::resolve_relative(&parent, link_target);
        let resolved = self.try_resolve_link(&target)?;
        match self.try_get_entry(&resolved)? {
            Some(record) if record.is_directory() => Ok(Some(resolved)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_capability::NullOs;
    use crate::storage::memory::MemoryStorage;

    fn facade(storage: &MemoryStorage, os: &NullOs) -> ArchiveFacade<'_> {
        ArchiveFacade::new(storage, os, ArchiveConfig::default())
    }

    #[test]
    fn archive_then_list_then_extract_round_trips() {
        let storage = MemoryStorage::new();
        let os = NullOs;
        let facade = facade(&storage, &os);

        let src = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/hi.txt"), b"hi\n").unwrap();

        facade.archive_from_filesystem("/", src.path()).unwrap();
        assert!(facade.is_directory("/sub").unwrap());
        assert!(facade.is_regular_file("/sub/hi.txt").unwrap());

        let listed = facade.list("/").unwrap();
        assert!(listed.iter().any(|e| e.archive_path == "/sub/hi.txt"));

        let dest = tempfile::tempdir().unwrap();
        facade.extract_to_filesystem("/", dest.path()).unwrap();
        let content = fs::read(dest.path().join("sub/hi.txt")).unwrap();
        assert_eq!(content, b"hi\n");
    }

    #[test]
    fn delete_then_exists_is_false() {
        let storage = MemoryStorage::new();
        let os = NullOs;
        let facade = facade(&storage, &os);

        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"x").unwrap();
        facade.archive_from_filesystem("/", src.path()).unwrap();

        facade.delete("/a.txt").unwrap();
        assert!(!facade.exists("/a.txt").unwrap());
    }

    #[test]
    fn self_resolving_symlink_is_a_cycle() {
        let storage = MemoryStorage::new();
        let os = NullOs;
        let facade = facade(&storage, &os);
        storage.create_soft_link("/loop", "/loop").unwrap();
        let mut record = LinkRecord::new("loop", FileLinkType::Symlink);
        record.link_target = Some("/loop".to_string());
        facade
            .index_provider
            .get(&storage, "/", false, facade.error_strategy.as_ref())
            .unwrap()
            .lock()
            .unwrap()
            .update(record);

        assert!(matches!(facade.try_resolve_link("/loop"), Err(ArchiveError::SymlinkCycle { .. })));
    }

    #[test]
    fn whitelist_excludes_non_matching_files() {
        let storage = MemoryStorage::new();
        let os = NullOs;
        let mut config = ArchiveConfig::default();
        config.file_whitelist.push("/keep.txt".to_string());
        let facade = ArchiveFacade::new(&storage, &os, config);

        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("keep.txt"), b"a").unwrap();
        fs::write(src.path().join("skip.txt"), b"b").unwrap();
        facade.archive_from_filesystem("/", src.path()).unwrap();

        assert!(facade.exists("/keep.txt").unwrap());
        assert!(!facade.exists("/skip.txt").unwrap());
    }
}
