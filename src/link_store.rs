//! Per-directory collection of link records (§3/§4.1, component C2).

use std::collections::HashMap;

use crate::error::Result;
use crate::link_record::{FileLinkType, LinkRecord};
use crate::storage::Storage;

/// A name-keyed collection of [`LinkRecord`]s bound to one archive
/// directory, with a lazily rebuilt sorted view.
///
/// Sort order: directories before non-directories, then lexicographic by
/// name (code-point ordering) within each class.
#[derive(Debug, Default)]
pub struct LinkStore {
    by_name: HashMap<String, LinkRecord>,
    sorted: Option<Vec<String>>,
}

fn sort_key(a: &LinkRecord, b: &LinkRecord) -> std::cmp::Ordering {
    let class = |r: &LinkRecord| if r.is_directory() { 0 } else { 1 };
    class(a).cmp(&class(b)).then_with(|| a.link_name.cmp(&b.link_name))
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = LinkRecord>) -> Self {
        let mut store = Self::new();
        store.update_many(records);
        store
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn try_get(&self, name: &str) -> Option<&LinkRecord> {
        self.by_name.get(name)
    }

    /// Insert or overwrite one record by name, invalidating the sorted
    /// cache.
    pub fn update(&mut self, record: LinkRecord) {
        self.by_name.insert(record.link_name.clone(), record);
        self.sorted = None;
    }

    pub fn update_many(&mut self, records: impl IntoIterator<Item = LinkRecord>) {
        for record in records {
            self.by_name.insert(record.link_name.clone(), record);
        }
        self.sorted = None;
    }

    pub fn remove(&mut self, name: &str) -> Option<LinkRecord> {
        let removed = self.by_name.remove(name);
        if removed.is_some() {
            self.sorted = None;
        }
        removed
    }

    fn ensure_sorted(&mut self) {
        if self.sorted.is_some() {
            return;
        }
        let mut names: Vec<&LinkRecord> = self.by_name.values().collect();
        names.sort_by(|a, b| sort_key(a, b));
        self.sorted = Some(names.into_iter().map(|r| r.link_name.clone()).collect());
    }

    /// Directories-first, lexicographic array of the current records.
    pub fn link_array(&mut self) -> Vec<LinkRecord> {
        self.ensure_sorted();
        self.sorted
            .as_ref()
            .expect("ensure_sorted populates this")
            .iter()
            .map(|name| self.by_name.get(name).expect("sorted index always in sync").clone())
            .collect()
    }

    /// Sorted iteration. Resets each record's verification fields before
    /// yielding, so repeated traversals start from a clean slate.
    pub fn iter(&mut self) -> impl Iterator<Item = LinkRecord> + '_ {
        self.ensure_sorted();
        let order = self.sorted.clone().unwrap_or_default();
        order.into_iter().filter_map(move |name| {
            let record = self.by_name.get_mut(&name)?;
            record.reset_verification();
            Some(record.clone())
        })
    }

    /// Walk all symlink records and query storage for their targets.
    /// Idempotent — calling it twice yields the same targets.
    pub fn amend_link_targets(&mut self, storage: &dyn Storage, group_path: &str) -> Result<()> {
        for record in self.by_name.values_mut() {
            if record.link_type != FileLinkType::Symlink {
                continue;
            }
            let child_path = crate::path_util::join(group_path, &record.link_name);
            if let Some(target) = storage.read_soft_link_target(&child_path)? {
                record.link_target = Some(target);
            }
        }
        Ok(())
    }
}
