//! Streaming "push" sink for archiving regular-file content (§4.5).
//!
//! Grounded on the teacher's `write_task.rs`/`stream_writer.rs` pair, which
//! accumulates bytes arriving out of a socket into a growable backing store
//! and reports completion back to the owning handle. Here the destination is
//! a chunked opaque dataset and the "owning handle" is the parent
//! [`DirectoryIndex`], which this writer registers itself on as a
//! [`Flushable`] so a `flush()`/`close()` on the directory can't race ahead
//! of buffered-but-unwritten bytes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::crc::RunningCrc32;
use crate::error::{ErrorStrategy, Result};
use crate::flushable::Flushable;
use crate::index::DirectoryIndex;
use crate::index_provider::IndexProvider;
use crate::link_record::LinkRecord;
use crate::os_capability::OsCapability;
use crate::storage::Storage;

struct State {
    written: u64,
    crc: RunningCrc32,
    finished: bool,
}

/// A byte sink created by [`crate::updater::ArchiveUpdater::archive_file`]
/// for the chunked (streaming) storage path. Callers push bytes via
/// [`Self::write`] and must call [`Self::finish`] exactly once when done.
pub struct StreamingWriter<'s> {
    storage: &'s dyn Storage,
    dataset_path: String,
    link_name: String,
    parent_index: Arc<Mutex<DirectoryIndex>>,
    parent_path: String,
    fs_parent_dir: Option<PathBuf>,
    index_provider: &'s IndexProvider,
    os: &'s dyn OsCapability,
    error_strategy: &'s dyn ErrorStrategy,
    immediate_group_only: bool,
    state: Mutex<State>,
}

impl<'s> StreamingWriter<'s> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: &'s dyn Storage,
        dataset_path: impl Into<String>,
        link_name: impl Into<String>,
        parent_index: Arc<Mutex<DirectoryIndex>>,
        index_provider: &'s IndexProvider,
        os: &'s dyn OsCapability,
        error_strategy: &'s dyn ErrorStrategy,
        immediate_group_only: bool,
        parent_path: impl Into<String>,
        fs_parent_dir: Option<PathBuf>,
    ) -> Arc<Self> {
        let writer = Arc::new(StreamingWriter {
            storage,
            dataset_path: dataset_path.into(),
            link_name: link_name.into(),
            parent_index,
            parent_path: parent_path.into(),
            fs_parent_dir,
            index_provider,
            os,
            error_strategy,
            immediate_group_only,
            state: Mutex::new(State { written: 0, crc: RunningCrc32::new(), finished: false }),
        });
        {
            let key = writer.dataset_path.clone();
            let flushable: Arc<dyn Flushable> = writer.clone();
            writer.parent_index.lock().unwrap().add_flushable(key, flushable);
        }
        writer
    }

    /// Append `bytes` at the current write offset, updating the running
    /// size and CRC32.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.storage.write_block(&self.dataset_path, bytes, state.written)?;
        state.crc.update(bytes);
        state.written += bytes.len() as u64;
        Ok(())
    }

    /// Finalize the written content: update the parent index's record with
    /// the final size/CRC32 and unregister from the flush chain. Safe to
    /// call at most once.
    pub fn finish(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.finished {
                return Ok(());
            }
            state.finished = true;
        }
        self.propagate()?;
        self.parent_index.lock().unwrap().remove_flushable(&self.dataset_path);
        Ok(())
    }

    fn propagate(&self) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            let mut guard = self.parent_index.lock().unwrap();
            if let Some(mut record) = guard.try_get(&self.link_name).cloned() {
                record.size = state.written as i64;
                record.crc32 = state.crc.finalize_clone() as i32;
                record.has_crc32 = true;
                guard.update(record);
            }
        }
        crate::updater::propagate_ancestors(
            self.storage,
            self.index_provider,
            self.os,
            self.error_strategy,
            self.immediate_group_only,
            &self.parent_path,
            self.fs_parent_dir.as_deref(),
        )
    }
}

impl Flushable for StreamingWriter<'_> {
    fn flush(&self) -> Result<()> {
        self.propagate()
    }
}

/// Convenience used by callers that already know the final bytes up front
/// (the contiguous small-file path does not go through [`StreamingWriter`]
/// at all; see [`crate::updater::ArchiveUpdater::archive_file`]).
pub fn record_for(link_name: &str, link_type: crate::link_record::FileLinkType) -> LinkRecord {
    LinkRecord::new(link_name, link_type)
}
