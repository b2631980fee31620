//! Archive deletion (§4.6, component C6): remove an entry and keep its
//! parent's index consistent.
//!
//! Grounded on the teacher's `examples/shadow_fs/fs/mod.rs` `remove`
//! handling, which likewise has to drop a child, invalidate any cached
//! state for it, and leave the parent directory's listing correct.

use crate::error::{ArchiveError, ErrorStrategy, Result};
use crate::index_provider::IndexProvider;
use crate::path_util;
use crate::storage::Storage;

pub struct ArchiveDeleter<'s> {
    storage: &'s dyn Storage,
    index_provider: &'s IndexProvider,
    error_strategy: &'s dyn ErrorStrategy,
}

impl<'s> ArchiveDeleter<'s> {
    pub fn new(storage: &'s dyn Storage, index_provider: &'s IndexProvider, error_strategy: &'s dyn ErrorStrategy) -> Self {
        ArchiveDeleter { storage, index_provider, error_strategy }
    }

    /// Delete `archive_path` (file, symlink, or whole directory subtree)
    /// and remove its entry from the parent's index. Deleting a directory
    /// invalidates any cached index for it and its descendants.
    pub fn delete(&self, archive_path: &str) -> Result<()> {
        let archive_path = path_util::normalize(archive_path);
        if !self.storage.exists(&archive_path)? {
            return Err(ArchiveError::NotFound { path: archive_path });
        }
        let Some((parent_path, name)) = path_util::split(&archive_path) else {
            return Err(ArchiveError::PathHasNoName { path: archive_path });
        };

        let is_group = self.storage.is_group(&archive_path)?;
        self.storage.delete(&archive_path)?;

        if is_group {
            self.invalidate_subtree(&archive_path);
        }

        let parent = self.index_provider.get(self.storage, &parent_path, false, self.error_strategy)?;
        parent.lock().unwrap().remove(name);
        Ok(())
    }

    fn invalidate_subtree(&self, group_path: &str) {
        self.index_provider.invalidate(group_path);
        if let Ok(members) = self.storage.get_group_members(group_path) {
            for member in members {
                if member.info.kind == crate::storage::LinkKind::Group {
                    let child = path_util::join(group_path, &member.name);
                    self.invalidate_subtree(&child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailFast;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn delete_removes_entry_from_parent_index() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        storage.write_bytes("/f", b"x", false).unwrap();
        {
            let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
            root.lock().unwrap().update(crate::link_record::LinkRecord::new("f", crate::link_record::FileLinkType::RegularFile));
        }

        let deleter = ArchiveDeleter::new(&storage, &index_provider, &FailFast);
        deleter.delete("/f").unwrap();

        let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
        assert!(!root.lock().unwrap().exists("f"));
        assert!(!storage.exists("/f").unwrap());
    }

    #[test]
    fn deleting_missing_path_errors() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        let deleter = ArchiveDeleter::new(&storage, &index_provider, &FailFast);
        assert!(deleter.delete("/nope").is_err());
    }

    #[test]
    fn deleting_a_directory_invalidates_cached_descendant_indices() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        storage.create_group("/d", None).unwrap();
        storage.create_group("/d/sub", None).unwrap();
        let _ = index_provider.get(&storage, "/d/sub", false, &FailFast).unwrap();
        assert_eq!(index_provider.len(), 1);

        let deleter = ArchiveDeleter::new(&storage, &index_provider, &FailFast);
        deleter.delete("/d").unwrap();
        // "/d/sub"'s cached index is gone; only the freshly-loaded parent
        // ("/") remains cached.
        assert_eq!(index_provider.len(), 1);
    }
}
