//! Serialized per-group index: `INDEX` + `INDEXNAMES` datasets, CRC32
//! guarded, lazily materialized and reconstructed on corruption (§3/§4.2,
//! component C3).

use std::sync::Arc;

use crate::compound;
use crate::crc;
use crate::error::{ArchiveError, ErrorStrategy, Recovered, Result};
use crate::flushable::Flushable;
use crate::link_record::{FileLinkType, LinkRecord};
use crate::link_store::LinkStore;
use crate::path_util;
use crate::storage::{LinkKind, Storage};

/// Dirty-tracking state (§4.2 "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Clean,
    Dirty,
}

/// The pair of datasets describing one group's children, plus the
/// in-memory [`LinkStore`] they materialize.
pub struct DirectoryIndex {
    group_path: String,
    store: LinkStore,
    state: State,
    flushables: Vec<(String, Arc<dyn Flushable>)>,
}

fn index_path(group_path: &str, suffix: &str) -> String {
    path_util::join(group_path, &format!("INDEX{suffix}"))
}

fn names_path(group_path: &str, suffix: &str) -> String {
    path_util::join(group_path, &format!("INDEXNAMES{suffix}"))
}

impl DirectoryIndex {
    /// Load (or reconstruct) the index for `group_path`.
    pub fn load(
        storage: &dyn Storage,
        group_path: &str,
        suffix: &str,
        with_link_targets: bool,
        error_strategy: &dyn ErrorStrategy,
    ) -> Result<Self> {
        let group_path = path_util::normalize(group_path);
        let index_path = index_path(&group_path, suffix);
        let names_path = names_path(&group_path, suffix);

        let have_both = storage.exists(&index_path)? && storage.exists(&names_path)?;
        let loaded = if have_both {
            match Self::read_from_disk(storage, &group_path, &index_path, &names_path, with_link_targets) {
                Ok(store) => Some(store),
                Err(err) => match error_strategy.handle(&group_path, err)? {
                    Recovered::Skipped => None,
                },
            }
        } else {
            None
        };

        let store = match loaded {
            Some(store) => store,
            None => Self::reconstruct(storage, &group_path, suffix, with_link_targets)?,
        };

        Ok(DirectoryIndex { group_path, store, state: State::Clean, flushables: Vec::new() })
    }

    fn read_from_disk(
        storage: &dyn Storage,
        group_path: &str,
        index_path: &str,
        names_path: &str,
        with_link_targets: bool,
    ) -> Result<LinkStore> {
        let index_bytes = storage.read_bytes(index_path)?;
        if index_bytes.len() % compound::RECORD_SIZE != 0 {
            return Err(ArchiveError::MalformedIndex {
                group_path: group_path.to_string(),
                detail: format!("INDEX length {} not a multiple of record size", index_bytes.len()),
            });
        }
        let record_count = index_bytes.len() / compound::RECORD_SIZE;
        let stored_crc = storage.get_i32_attribute(index_path, "CRC32")?.ok_or_else(|| {
            ArchiveError::MalformedIndex { group_path: group_path.to_string(), detail: "missing CRC32 attribute".into() }
        })?;

        let mut field_hasher_input: Vec<&[u8]> = Vec::with_capacity(record_count * 8);
        let mut encoded_records: Vec<[u8; compound::RECORD_SIZE]> = Vec::with_capacity(record_count);
        for chunk in index_bytes.chunks_exact(compound::RECORD_SIZE) {
            let mut arr = [0u8; compound::RECORD_SIZE];
            arr.copy_from_slice(chunk);
            encoded_records.push(arr);
        }
        for encoded in &encoded_records {
            field_hasher_input.extend(compound::field_slices(encoded));
        }
        let field_crc = crc::crc32_of_fields(field_hasher_input.into_iter()) as i32;
        if field_crc != stored_crc {
            let whole_crc = crc::crc32_of(&index_bytes) as i32;
            if whole_crc != stored_crc {
                return Err(ArchiveError::IndexChecksumMismatch { group_path: group_path.to_string() });
            }
        }

        let names_bytes = storage.read_bytes(names_path)?;
        let stored_names_crc = storage.get_i32_attribute(names_path, "CRC32")?.ok_or_else(|| {
            ArchiveError::MalformedIndex { group_path: group_path.to_string(), detail: "missing CRC32 attribute".into() }
        })?;
        if crc::crc32_of(&names_bytes) as i32 != stored_names_crc {
            return Err(ArchiveError::IndexChecksumMismatch { group_path: group_path.to_string() });
        }
        let trimmed = names_bytes.strip_suffix(&[0u8]).unwrap_or(&names_bytes);
        let names_str = std::str::from_utf8(trimmed).map_err(|e| ArchiveError::MalformedIndex {
            group_path: group_path.to_string(),
            detail: format!("INDEXNAMES is not valid UTF-8: {e}"),
        })?;

        let mut records = Vec::with_capacity(record_count);
        let mut cursor = 0usize;
        for encoded in &encoded_records {
            let (mut record, name_len) = compound::decode_record(encoded)?;
            let name_len = name_len as usize;
            if cursor + name_len > names_str.len() {
                return Err(ArchiveError::MalformedIndex {
                    group_path: group_path.to_string(),
                    detail: "INDEXNAMES shorter than sum of link_name_length".into(),
                });
            }
            record.link_name = names_str[cursor..cursor + name_len].to_string();
            cursor += name_len;
            records.push(record);
        }

        let mut store = LinkStore::from_records(records);
        if with_link_targets {
            store.amend_link_targets(storage, group_path)?;
        }
        Ok(store)
    }

    fn reconstruct(storage: &dyn Storage, group_path: &str, suffix: &str, with_link_targets: bool) -> Result<LinkStore> {
        tracing::warn!(group_path, "reconstructing index from group enumeration");
        let index_name = format!("INDEX{suffix}");
        let names_name = format!("INDEXNAMES{suffix}");
        let members = storage.get_group_members(group_path)?;
        let mut records = Vec::new();
        for member in members {
            if member.name == index_name || member.name == names_name {
                continue;
            }
            let child_path = path_util::join(group_path, &member.name);
            let mut record = match member.info.kind {
                LinkKind::Group => LinkRecord::new(member.name.clone(), FileLinkType::Directory),
                LinkKind::Dataset => {
                    let mut r = LinkRecord::new(member.name.clone(), FileLinkType::RegularFile);
                    r.size = storage.get_dataset_size(&child_path)? as i64;
                    r
                }
                LinkKind::SoftLink => {
                    let mut r = LinkRecord::new(member.name.clone(), FileLinkType::Symlink);
                    if with_link_targets {
                        r.link_target = member.info.target.clone();
                    }
                    r
                }
                LinkKind::Other => LinkRecord::new(member.name.clone(), FileLinkType::Other),
            };
            if record.link_type != FileLinkType::RegularFile {
                record.size = crate::link_record::UNKNOWN;
            }
            debug_assert!(
                record.is_regular_file() || compound::is_bare(&record),
                "reconstructed record should carry no metadata beyond link_type/size"
            );
            records.push(record);
        }
        Ok(LinkStore::from_records(records))
    }

    pub fn group_path(&self) -> &str {
        &self.group_path
    }

    pub fn exists(&self, name: &str) -> bool {
        self.store.exists(name)
    }

    pub fn try_get(&self, name: &str) -> Option<&LinkRecord> {
        self.store.try_get(name)
    }

    pub fn link_array(&mut self) -> Vec<LinkRecord> {
        self.store.link_array()
    }

    pub fn iter(&mut self) -> impl Iterator<Item = LinkRecord> + '_ {
        self.store.iter()
    }

    pub fn update(&mut self, record: LinkRecord) {
        self.store.update(record);
        self.state = State::Dirty;
    }

    pub fn update_many(&mut self, records: impl IntoIterator<Item = LinkRecord>) {
        self.store.update_many(records);
        self.state = State::Dirty;
    }

    pub fn remove(&mut self, name: &str) -> Option<LinkRecord> {
        let removed = self.store.remove(name);
        if removed.is_some() {
            self.state = State::Dirty;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.state == State::Dirty
    }

    /// Upgrade an already-loaded index in place by reading symlink targets
    /// for every child that doesn't have one yet (§4.3 "Upgrade on
    /// demand"). Never replaces `self.store`, so any unflushed dirty
    /// mutation survives the upgrade.
    pub fn amend_link_targets(&mut self, storage: &dyn Storage) -> Result<()> {
        self.store.amend_link_targets(storage, &self.group_path)
    }

    /// Register a streaming writer so its bytes flush before this index
    /// serializes itself (§4.2 Flushables). Registers under `key` (by
    /// convention, the child's dataset path) so a matching
    /// [`Self::remove_flushable`] call can find it again.
    pub fn add_flushable(&mut self, key: impl Into<String>, flushable: Arc<dyn Flushable>) {
        self.flushables.push((key.into(), flushable));
    }

    pub fn remove_flushable(&mut self, key: &str) {
        self.flushables.retain(|(k, _)| k != key);
    }

    fn flush_externals(&self) {
        for (key, flushable) in &self.flushables {
            if let Err(err) = flushable.flush() {
                tracing::error!(key, error = %err, "external flushable failed during index flush; swallowing");
            }
        }
    }

    /// Flush: run registered externals first, then (if dirty) serialize
    /// both datasets and recompute their `CRC32` attributes (§4.2 "Write
    /// path").
    pub fn flush(&mut self, storage: &dyn Storage, suffix: &str) -> Result<()> {
        self.flush_externals();
        if self.state != State::Dirty {
            return Ok(());
        }

        let records = self.store.link_array();
        let mut names_buf = Vec::new();
        let mut encoded_records = Vec::with_capacity(records.len());
        for record in &records {
            let name_bytes = record.link_name.as_bytes();
            names_buf.extend_from_slice(name_bytes);
            encoded_records.push(compound::encode_record(record, name_bytes.len() as i32));
        }
        names_buf.push(0u8);

        let names_path = names_path(&self.group_path, suffix);
        storage.write_bytes(&names_path, &names_buf, true)?;
        let names_crc = crc::crc32_of(&names_buf);
        storage.set_i32_attribute(&names_path, "CRC32", names_crc as i32)?;

        let index_path = index_path(&self.group_path, suffix);
        let mut index_bytes = Vec::with_capacity(encoded_records.len() * compound::RECORD_SIZE);
        let mut field_inputs: Vec<&[u8]> = Vec::with_capacity(encoded_records.len() * 8);
        for encoded in &encoded_records {
            index_bytes.extend_from_slice(encoded);
        }
        for encoded in &encoded_records {
            field_inputs.extend(compound::field_slices(encoded));
        }
        let index_crc = crc::crc32_of_fields(field_inputs.into_iter());
        storage.write_bytes(&index_path, &index_bytes, false)?;
        storage.set_i32_attribute(&index_path, "CRC32", index_crc as i32)?;

        self.state = State::Clean;
        tracing::debug!(group_path = %self.group_path, records = records.len(), "flushed index");
        Ok(())
    }

    /// Flush then drop all registered flushables (§4.2 "close").
    pub fn close(&mut self, storage: &dyn Storage, suffix: &str) -> Result<()> {
        self.flush(storage, suffix)?;
        self.flushables.clear();
        Ok(())
    }
}
