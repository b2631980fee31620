//! Anything an [`crate::index::DirectoryIndex`] must flush before
//! persisting itself (§4.2 "Flushables", §4.5 streaming writers).

use crate::error::Result;

/// An external writer (currently: [`crate::updater::StreamingWriter`])
/// that registers itself on the parent directory's index so its buffered
/// bytes are flushed before the index serializes.
pub trait Flushable: Send + Sync {
    fn flush(&self) -> Result<()>;
}
