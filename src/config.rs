//! Archive-wide configuration (§10.3), loaded from TOML via `serde` —
//! the same pairing the teacher uses for its own on-disk configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Byte threshold under which a regular file is stored contiguously rather
/// than chunked (§4.5 small-file optimization, §8 boundary behavior).
pub const DEFAULT_SMALL_FILE_THRESHOLD: usize = 4096;

/// Minimum supported on-disk layout. `MemoryStorage` only ever writes `V1`;
/// the field exists so a future real HDF5 `Storage` backend has somewhere
/// to record the lower bound it will still read (§4.5 directory pre-create
/// rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormatVersion {
    V1,
}

/// Compression policy applied when archiving a regular file (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchivingStrategyKind {
    /// Always deflate, subject to `compression_blacklist`.
    Compress,
    /// Never deflate, subject to `compression_whitelist`.
    NoCompress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Suffix appended to `INDEX`/`INDEXNAMES` dataset names to avoid
    /// colliding with archived content of the same name (§3).
    pub housekeeping_suffix: String,
    /// Read/write buffer size used by the streaming path (§4.5).
    pub buffer_size: usize,
    /// Byte threshold for the small-file contiguous-storage optimization.
    pub small_file_threshold: usize,
    /// Chunk size used for chunked opaque datasets.
    pub chunk_size: u64,
    /// Lower bound of the on-disk layout this handle will read/write.
    pub format_version: FormatVersion,
    /// Default compression policy for newly archived files.
    pub archiving_strategy: ArchivingStrategyKind,
    /// Overrides `archiving_strategy` to skip compression for matching
    /// paths (already-compressed content).
    pub compression_blacklist: Vec<String>,
    /// Overrides `archiving_strategy` to force compression for matching
    /// paths.
    pub compression_whitelist: Vec<String>,
    /// Inclusion glob patterns for regular files (§4.5 `ArchivingStrategy`).
    pub file_whitelist: Vec<String>,
    pub file_blacklist: Vec<String>,
    /// Inclusion glob patterns for directories.
    pub directory_whitelist: Vec<String>,
    pub directory_blacklist: Vec<String>,
    /// When true, an archive mutation only updates its immediate parent's
    /// index. When false, it walks every ancestor up to the root,
    /// refreshing each ancestor's own record in *its* parent (§4.5
    /// "Propagation").
    pub immediate_group_only: bool,
    /// Pass-through knobs for a real HDF5-backed `Storage::open_for_writing`
    /// (§6.1); `MemoryStorage` ignores all three.
    pub sync_mode: bool,
    pub generate_mdc_image: bool,
    pub utf8_encoding: bool,
    /// Maximum cached [`crate::index_provider::IndexProvider`] entries.
    pub index_cache_capacity: u64,
    /// Maximum symlink hops [`crate::facade::ArchiveFacade`] follows before
    /// reporting a cycle (§4.6 traverser).
    pub max_symlink_hops: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            housekeeping_suffix: "\u{1}\u{0}".to_string(),
            buffer_size: 10 * 1024 * 1024,
            small_file_threshold: DEFAULT_SMALL_FILE_THRESHOLD,
            chunk_size: 64 * 1024,
            format_version: FormatVersion::V1,
            archiving_strategy: ArchivingStrategyKind::Compress,
            compression_blacklist: Vec::new(),
            compression_whitelist: Vec::new(),
            file_whitelist: Vec::new(),
            file_blacklist: Vec::new(),
            directory_whitelist: Vec::new(),
            directory_blacklist: Vec::new(),
            immediate_group_only: true,
            sync_mode: false,
            generate_mdc_image: false,
            utf8_encoding: true,
            index_cache_capacity: 10_000,
            max_symlink_hops: 40,
        }
    }
}

impl ArchiveConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ArchiveError::storage("parse config", e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ArchiveError::storage("serialize config", e.to_string()))
    }

    /// Whether `archive_path` should be archived at all, given its kind.
    pub fn is_file_included(&self, archive_path: &str) -> bool {
        crate::path_util::included(archive_path, &self.file_whitelist, &self.file_blacklist)
    }

    pub fn is_directory_included(&self, archive_path: &str) -> bool {
        crate::path_util::included(archive_path, &self.directory_whitelist, &self.directory_blacklist)
    }

    /// Whether `archive_path` should be deflate-compressed, per
    /// `archiving_strategy` overridden by the compression white/blacklist.
    pub fn should_compress(&self, archive_path: &str) -> bool {
        let matches = |patterns: &[String]| patterns.iter().any(|p| crate::path_util::glob_match(p, archive_path));
        match self.archiving_strategy {
            ArchivingStrategyKind::Compress => !matches(&self.compression_blacklist),
            ArchivingStrategyKind::NoCompress => matches(&self.compression_whitelist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ArchiveConfig::default();
        assert_eq!(cfg.small_file_threshold, 4096);
        assert_eq!(cfg.archiving_strategy, ArchivingStrategyKind::Compress);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = ArchiveConfig::default();
        cfg.file_whitelist.push("*.rs".to_string());
        let s = cfg.to_toml_string().unwrap();
        let reloaded = ArchiveConfig::from_toml_str(&s).unwrap();
        assert_eq!(reloaded.file_whitelist, vec!["*.rs".to_string()]);
    }

    #[test]
    fn should_compress_respects_blacklist_under_compress_strategy() {
        let mut cfg = ArchiveConfig::default();
        cfg.compression_blacklist.push("*.zip".to_string());
        assert!(!cfg.should_compress("a.zip"));
        assert!(cfg.should_compress("a.txt"));
    }

    #[test]
    fn should_compress_respects_whitelist_under_no_compress_strategy() {
        let mut cfg = ArchiveConfig::default();
        cfg.archiving_strategy = ArchivingStrategyKind::NoCompress;
        cfg.compression_whitelist.push("*.txt".to_string());
        assert!(cfg.should_compress("a.txt"));
        assert!(!cfg.should_compress("a.zip"));
    }
}
