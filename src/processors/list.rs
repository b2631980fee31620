//! Listing processor (§4.8, component C8a): collect every visited entry's
//! path and record without touching the filesystem.

use crate::error::Result;
use crate::link_record::LinkRecord;
use crate::traverser::Processor;

#[derive(Debug, Clone)]
pub struct ListEntry {
    pub archive_path: String,
    pub record: LinkRecord,
}

/// Accumulates every entry the traverser visits, in visitation order
/// (directories-first, lexicographic per directory).
#[derive(Default)]
pub struct ListProcessor {
    pub entries: Vec<ListEntry>,
}

impl ListProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for ListProcessor {
    fn on_entry(&mut self, archive_path: &str, record: &LinkRecord) -> Result<()> {
        self.entries.push(ListEntry { archive_path: archive_path.to_string(), record: record.clone() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailFast;
    use crate::index_provider::IndexProvider;
    use crate::link_record::FileLinkType;
    use crate::storage::memory::MemoryStorage;
    use crate::traverser::Traverser;

    #[test]
    fn collects_every_entry_in_order() {
        let storage = MemoryStorage::new();
        let index_provider = IndexProvider::new("\u{1}\u{0}", 100);
        storage.write_bytes("/a.txt", b"x", false).unwrap();
        {
            let root = index_provider.get(&storage, "/", false, &FailFast).unwrap();
            root.lock().unwrap().update(LinkRecord::new("a.txt", FileLinkType::RegularFile));
        }

        let traverser = Traverser::new(&storage, &index_provider, &FailFast);
        let mut list = ListProcessor::new();
        traverser.walk("/", &LinkRecord::new("", FileLinkType::Directory), &mut list).unwrap();

        assert_eq!(list.entries.len(), 2); // root + a.txt
        assert_eq!(list.entries[1].archive_path, "/a.txt");
    }
}
