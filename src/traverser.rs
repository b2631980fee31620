//! Depth-first walk over the stored archive tree with a pluggable visitor
//! (§4.7, component C7).
//!
//! Grounded on the teacher's `examples/shadow_fs/fs/mod.rs` directory
//! listing/recursion pattern. Symlinks are visited as leaves by default;
//! following one into a directory is opt-in via [`TraverseOptions`].
//! Resolving a symlink's target and detecting *chain* cycles (A -> B -> A)
//! is still the facade's job (§4.6) through [`SymlinkResolver`] — the
//! traverser only guards against re-entering a directory it is already
//! inside, a narrower, generic graph-walk concern.

use std::collections::HashSet;

use crate::error::{ErrorStrategy, Recovered, Result};
use crate::index_provider::IndexProvider;
use crate::link_record::{FileLinkType, LinkRecord};
use crate::path_util;
use crate::storage::Storage;

/// Visitor invoked once per entry, in directories-first/lexicographic order
/// (the same order [`crate::link_store::LinkStore::iter`] produces).
pub trait Processor {
    /// Called for every entry — directory, file, or symlink — before a
    /// directory's children are visited.
    fn on_entry(&mut self, archive_path: &str, record: &LinkRecord) -> Result<()>;

    /// Called after every child of a directory has been visited (or
    /// skipped). Default no-op; [`crate::processors::extract`] uses it to
    /// restore directory mtimes only after their contents exist.
    fn on_directory_done(&mut self, _archive_path: &str) -> Result<()> {
        Ok(())
    }
}

/// Resolves a symlink to the archive directory it points at, if any.
/// Implemented by [`crate::facade::ArchiveFacade`], which already owns the
/// hop-limited cycle detector for symlink chains (§4.6); the traverser
/// only ever asks "where does this one link point", never "is this a
/// cycle".
pub trait SymlinkResolver {
    fn resolve_directory(&self, archive_path: &str, link_target: &str) -> Result<Option<String>>;
}

/// Parameters controlling how far and how a walk explores (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct TraverseOptions {
    /// Descend into subdirectories at all. `false` visits only the
    /// immediate children of the root.
    pub recursive: bool,
    /// Request link targets from the index provider (needed to report
    /// symlink destinations; costs an index upgrade when not already
    /// cached, see [`crate::index_provider::IndexProvider`]).
    pub read_link_targets: bool,
    /// Follow a symlink into the directory it targets, walking it as if
    /// it were a real subdirectory.
    pub follow_symlinks: bool,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        TraverseOptions { recursive: true, read_link_targets: true, follow_symlinks: false }
    }
}

pub struct Traverser<'s> {
    storage: &'s dyn Storage,
    index_provider: &'s IndexProvider,
    error_strategy: &'s dyn ErrorStrategy,
    resolver: Option<&'s dyn SymlinkResolver>,
}

impl<'s> Traverser<'s> {
    pub fn new(storage: &'s dyn Storage, index_provider: &'s IndexProvider, error_strategy: &'s dyn ErrorStrategy) -> Self {
        Traverser { storage, index_provider, error_strategy, resolver: None }
    }

    pub fn with_resolver(mut self, resolver: &'s dyn SymlinkResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Walk `root_path` and everything beneath it, feeding every entry
    /// (including `root_path` itself, described by `root_record`) to
    /// `processor`, using [`TraverseOptions::default`].
    pub fn walk(&self, root_path: &str, root_record: &LinkRecord, processor: &mut dyn Processor) -> Result<()> {
        self.walk_with(root_path, root_record, processor, &TraverseOptions::default())
    }

    /// As [`Self::walk`], with explicit [`TraverseOptions`].
    pub fn walk_with(&self, root_path: &str, root_record: &LinkRecord, processor: &mut dyn Processor, options: &TraverseOptions) -> Result<()> {
        let root_path = path_util::normalize(root_path);
        processor.on_entry(&root_path, root_record)?;
        if root_record.is_directory() {
            let mut visiting = HashSet::new();
            visiting.insert(root_path.clone());
            self.walk_children(&root_path, processor, options, &mut visiting)?;
            processor.on_directory_done(&root_path)?;
        }
        Ok(())
    }

    /// Visit every entry directly under `dir_path`, recursing into child
    /// directories (and followed symlinks) only when `options.recursive`
    /// is set — `false` keeps a listing to one level deep while still
    /// reporting every immediate child.
    fn walk_children(&self, dir_path: &str, processor: &mut dyn Processor, options: &TraverseOptions, visiting: &mut HashSet<String>) -> Result<()> {
        let with_link_targets = options.read_link_targets || options.follow_symlinks;
        let index = self.index_provider.get(self.storage, dir_path, with_link_targets, self.error_strategy)?;
        let records = index.lock().unwrap().link_array();
        for record in records {
            let child_path = path_util::join(dir_path, &record.link_name);
            match processor.on_entry(&child_path, &record) {
                Ok(()) => {}
                Err(err) => match self.error_strategy.handle(&child_path, err)? {
                    Recovered::Skipped => continue,
                },
            }
            if !options.recursive {
                continue;
            }

            if record.link_type == FileLinkType::Directory {
                self.visit_directory(&child_path, processor, options, visiting)?;
            } else if record.link_type == FileLinkType::Symlink && options.follow_symlinks {
                if let (Some(resolver), Some(target)) = (self.resolver, record.link_target.as_deref()) {
                    if let Some(resolved) = resolver.resolve_directory(&child_path, target)? {
                        self.visit_directory(&resolved, processor, options, visiting)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn visit_directory(&self, dir_path: &str, processor: &mut dyn Processor, options: &TraverseOptions, visiting: &mut HashSet<String>) -> Result<()> {
        if !visiting.insert(dir_path.to_string()) {
            return Ok(());
        }
        self.walk_children(dir_path, processor, options, visiting)?;
        processor.on_directory_done(dir_path)?;
        visiting.remove(dir_path);
        Ok(())
    }
}
