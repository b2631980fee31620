//! Archive-wide error type and the injectable error-handling strategy.
//!
//! The taxonomy follows the five classes an archive operation can fail
//! with: archive-format errors (corrupt/missing index), archive-integrity
//! errors (verification mismatches), I/O errors, usage errors, and
//! symlink-resolution errors.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Everything that can go wrong while reading, mutating, or verifying an
/// archive.
#[derive(Debug)]
pub enum ArchiveError {
    /// The on-disk index of a group failed its checksum and could not be
    /// recovered by reconstruction either.
    IndexChecksumMismatch { group_path: String },
    /// `INDEX` and `INDEXNAMES` disagree in length, or a compound record
    /// could not be decoded.
    MalformedIndex { group_path: String, detail: String },
    /// A lookup against the archive tree found nothing at the given path.
    NotFound { path: String },
    /// The requested mutation targets a read-only archive handle.
    ReadOnly,
    /// A symlink entry has no `link_target` recorded.
    MissingLinkTarget { path: String },
    /// A path has no final component to use as a name (e.g. `/`).
    PathHasNoName { path: String },
    /// Symlink resolution found a cycle or exceeded the hop limit.
    SymlinkCycle { path: String },
    /// An entry failed verification against the filesystem.
    VerificationFailed { path: String, detail: String },
    /// Wraps an I/O error from the filesystem or the storage provider.
    Io { context: String, source: io::Error },
    /// Catch-all for storage-provider failures that don't fit elsewhere.
    Storage { context: String, detail: String },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::IndexChecksumMismatch { group_path } => {
                write!(f, "index checksum mismatch at {group_path}")
            }
            ArchiveError::MalformedIndex { group_path, detail } => {
                write!(f, "malformed index at {group_path}: {detail}")
            }
            ArchiveError::NotFound { path } => write!(f, "object not found: {path}"),
            ArchiveError::ReadOnly => write!(f, "archive handle is read-only"),
            ArchiveError::MissingLinkTarget { path } => {
                write!(f, "symlink {path} has no recorded target")
            }
            ArchiveError::PathHasNoName { path } => write!(f, "path has no name: {path}"),
            ArchiveError::SymlinkCycle { path } => write!(f, "no resolution for {path}"),
            ArchiveError::VerificationFailed { path, detail } => {
                write!(f, "{path}: {detail}")
            }
            ArchiveError::Io { context, source } => write!(f, "{context}: {source}"),
            ArchiveError::Storage { context, detail } => write!(f, "{context}: {detail}"),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ArchiveError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ArchiveError::Io { context: context.into(), source }
    }

    pub fn storage(context: impl Into<String>, detail: impl Into<String>) -> Self {
        ArchiveError::Storage { context: context.into(), detail: detail.into() }
    }
}

/// Outcome an [`ErrorStrategy`] produces when it chooses not to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered {
    /// The caller should treat the affected item as skipped and move on.
    Skipped,
}

/// Injectable policy for what happens when a surfaceable error occurs.
///
/// Mirrors the teacher's pattern of injecting long-lived trait-object
/// behavior (there, the `Vfs` implementation handed to connection tasks;
/// here, the strategy handed to every component that can fail mid-walk).
pub trait ErrorStrategy: Send + Sync {
    /// Handle `err` that occurred while processing `context` (a path or
    /// other short description). Returns `Ok(Recovered::Skipped)` if the
    /// caller should continue, or `Err(err)` to abort.
    fn handle(&self, context: &str, err: ArchiveError) -> Result<Recovered>;
}

/// Re-throws every error. The default strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFast;

impl ErrorStrategy for FailFast {
    fn handle(&self, _context: &str, err: ArchiveError) -> Result<Recovered> {
        Err(err)
    }
}

/// Logs the error via `tracing::error!` and tells the caller to continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndContinue;

impl ErrorStrategy for LogAndContinue {
    fn handle(&self, context: &str, err: ArchiveError) -> Result<Recovered> {
        tracing::error!(%context, error = %err, "continuing after recoverable error");
        Ok(Recovered::Skipped)
    }
}

/// Convenience constructor used by components that take a strategy by
/// `Arc<dyn ErrorStrategy>`.
pub fn fail_fast() -> Arc<dyn ErrorStrategy> {
    Arc::new(FailFast)
}

pub fn log_and_continue() -> Arc<dyn ErrorStrategy> {
    Arc::new(LogAndContinue)
}
