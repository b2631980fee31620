//! A filesystem-style archive format layered on an HDF5-shaped storage
//! container: directories are groups, files are opaque datasets, symlinks
//! are soft links, and every directory carries a CRC32-guarded index of its
//! children.
//!
//! The [`facade::ArchiveFacade`] is the intended entry point; it wires
//! together the directory index cache, the updater/deleter/traverser, and
//! the list/verify/extract processors behind one API. Everything else is
//! exported for callers who want to compose the pieces themselves, or
//! supply their own [`storage::Storage`] / [`os_capability::OsCapability`]
//! implementation.

pub mod compound;
pub mod config;
pub mod crc;
pub mod deleter;
pub mod error;
pub mod facade;
pub mod flushable;
pub mod index;
pub mod index_provider;
pub mod link_record;
pub mod link_store;
pub mod os_capability;
pub mod path_util;
pub mod processors;
pub mod storage;
pub mod stream_writer;
pub mod traverser;
pub mod updater;

pub use config::ArchiveConfig;
pub use error::{ArchiveError, ErrorStrategy, Result};
pub use facade::ArchiveFacade;
pub use link_record::{FileLinkType, LinkRecord};
