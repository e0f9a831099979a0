// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! File collections: declarative sets of files and directories.
//!
//! ```text
//! FileCollection
//!   Empty | Files([a.txt, b.txt]) | Dir{root, filters} | Union[...]
//!        |
//!        v
//!   resolve_entries() --> sorted (path, is_dir) pairs
//!   includes()        --> pure path/filter membership, no filesystem
//!   intersection()    --> paths both collections would accept
//! ```
//!
//! Collections are the vocabulary tasks use to declare their inputs and
//! outputs. The cache hashes what they resolve to; the task-I/O verifier
//! reasons about them without touching the filesystem via [`FileCollection::includes`]
//! and [`FileCollection::intersection`].

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::Result;

/// A resolved filesystem entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FileEntry {
    /// Creates a file entry.
    #[must_use]
    pub const fn file(path: PathBuf) -> Self {
        Self {
            path,
            is_dir: false,
        }
    }

    /// Creates a directory entry.
    #[must_use]
    pub const fn dir(path: PathBuf) -> Self {
        Self { path, is_dir: true }
    }
}

/// Directory selector with filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirFilter {
    root: PathBuf,
    recurse: bool,
    include_hidden: bool,
    /// Accepted file extensions, stored without a leading dot. Empty
    /// means all files are accepted. Applies to files only.
    extensions: BTreeSet<String>,
    /// Excluded basenames; matching files are dropped and matching
    /// directories are not descended into.
    exclusions: BTreeSet<String>,
}

impl DirFilter {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            recurse: true,
            include_hidden: false,
            extensions: BTreeSet::new(),
            exclusions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn recurse(&self) -> bool {
        self.recurse
    }

    /// Whether `name` is filtered out as a basename, before any
    /// extension consideration.
    fn rejects_basename(&self, name: &str) -> bool {
        (!self.include_hidden && is_hidden(name)) || self.exclusions.contains(name)
    }

    /// Whether a file basename passes the extension filter.
    fn accepts_extension(&self, name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        name.rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && self.extensions.contains(ext))
    }

    /// Pure path-logic membership: would this selector accept `path`?
    ///
    /// Never touches the filesystem, so it also answers for paths that do
    /// not (yet, or anymore) exist.
    fn includes(&self, path: &Path, is_dir: bool) -> bool {
        if path == self.root {
            return is_dir;
        }
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return false;
        };
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        if parts.is_empty() || parts.len() != rel.components().count() {
            return false;
        }
        // Without recursion only direct children are in scope.
        if !self.recurse && parts.len() > 1 {
            return false;
        }
        // Every path component must survive the basename filters.
        if parts.iter().any(|name| self.rejects_basename(name)) {
            return false;
        }
        if is_dir {
            // Directory entries beyond the root only exist for recursive
            // selectors (a flat selector fingerprints the root alone).
            self.recurse
        } else {
            self.accepts_extension(parts[parts.len() - 1])
        }
    }

    /// Walks the filesystem and returns everything this selector accepts.
    ///
    /// The root directory itself is always part of the result, present on
    /// disk or not: it is a declared entity.
    fn resolve(&self) -> Result<Vec<FileEntry>> {
        let mut entries = vec![FileEntry::dir(self.root.clone())];
        if !self.root.is_dir() {
            return Ok(entries);
        }

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .hidden(!self.include_hidden)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        if !self.recurse {
            builder.max_depth(Some(1));
        }
        let exclusions = self.exclusions.clone();
        if !exclusions.is_empty() {
            builder.filter_entry(move |entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_none_or(|name| !exclusions.contains(name))
            });
        }

        for entry in builder.build() {
            let entry = entry?;
            if entry.depth() == 0 {
                continue;
            }
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            let path = normalize_path(entry.path());
            if is_dir {
                if self.recurse {
                    entries.push(FileEntry::dir(path));
                }
            } else if entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.accepts_extension(name))
            {
                entries.push(FileEntry::file(path));
            }
        }

        Ok(entries)
    }
}

/// A declarative, composable set of files and directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCollection {
    /// Resolves to nothing.
    Empty,
    /// Explicitly declared file paths, present on disk or not.
    Files(Vec<PathBuf>),
    /// A directory tree with filters.
    Dir(DirFilter),
    /// Union of collections.
    Union(Vec<FileCollection>),
}

impl Default for FileCollection {
    fn default() -> Self {
        Self::Empty
    }
}

impl FileCollection {
    /// The empty collection.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// A collection of exactly one declared file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::Files(vec![normalize_path(&path.into())])
    }

    /// A collection of declared files; order is not significant.
    pub fn files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut normalized: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| normalize_path(&p.into()))
            .collect();
        normalized.sort();
        normalized.dedup();
        if normalized.is_empty() {
            Self::Empty
        } else {
            Self::Files(normalized)
        }
    }

    /// A recursive directory collection with no filters.
    ///
    /// Use the `with_*` methods to restrict it.
    pub fn dir(root: impl Into<PathBuf>) -> Self {
        Self::Dir(DirFilter::new(normalize_path(&root.into())))
    }

    /// Union of directory collections over several roots.
    pub fn dirs<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::Union(roots.into_iter().map(Self::dir).collect())
    }

    /// Restricts a directory collection to its direct children.
    ///
    /// # Panics
    ///
    /// Panics when applied to a non-directory collection.
    #[must_use]
    pub fn with_recurse(mut self, recurse: bool) -> Self {
        match &mut self {
            Self::Dir(filter) => filter.recurse = recurse,
            _ => panic!("with_recurse applies to dir collections only"),
        }
        self
    }

    /// Includes entries whose basename starts with a dot.
    ///
    /// # Panics
    ///
    /// Panics when applied to a non-directory collection.
    #[must_use]
    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        match &mut self {
            Self::Dir(filter) => filter.include_hidden = include_hidden,
            _ => panic!("with_hidden applies to dir collections only"),
        }
        self
    }

    /// Restricts files to the given extensions, accepted with or without
    /// a leading dot.
    ///
    /// # Panics
    ///
    /// Panics when applied to a non-directory collection.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match &mut self {
            Self::Dir(filter) => {
                filter.extensions = extensions
                    .into_iter()
                    .map(|e| {
                        let e = e.into();
                        e.strip_prefix('.').map_or_else(|| e.clone(), String::from)
                    })
                    .collect();
            }
            _ => panic!("with_extensions applies to dir collections only"),
        }
        self
    }

    /// Excludes entries by basename; excluded directories are not
    /// descended into.
    ///
    /// # Panics
    ///
    /// Panics when applied to a non-directory collection.
    #[must_use]
    pub fn with_exclusions<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match &mut self {
            Self::Dir(filter) => {
                filter.exclusions = exclusions.into_iter().map(Into::into).collect();
            }
            _ => panic!("with_exclusions applies to dir collections only"),
        }
        self
    }

    /// Combines two collections into their union.
    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, other) => other,
            (this, Self::Empty) => this,
            (Self::Union(mut a), Self::Union(b)) => {
                a.extend(b);
                Self::Union(a)
            }
            (Self::Union(mut a), b) => {
                a.push(b);
                Self::Union(a)
            }
            (a, b) => Self::Union(vec![a, b]),
        }
    }

    /// Whether the collection can never resolve to anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Files(paths) => paths.is_empty(),
            Self::Dir(_) => false,
            Self::Union(parts) => parts.iter().all(Self::is_empty),
        }
    }

    /// Resolves the collection against the filesystem.
    ///
    /// Declared files and directory roots appear whether or not they
    /// exist on disk; everything else is discovered by walking. The
    /// result is lexicographically sorted and free of duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory walk fails for reasons other than
    /// a missing root.
    pub fn resolve_entries(&self) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        self.collect_entries(&mut entries)?;
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn collect_entries(&self, out: &mut Vec<FileEntry>) -> Result<()> {
        match self {
            Self::Empty => {}
            Self::Files(paths) => {
                out.extend(paths.iter().cloned().map(FileEntry::file));
            }
            Self::Dir(filter) => out.extend(filter.resolve()?),
            Self::Union(parts) => {
                for part in parts {
                    part.collect_entries(out)?;
                }
            }
        }
        Ok(())
    }

    /// Resolves only the file entities.
    ///
    /// # Errors
    ///
    /// See [`FileCollection::resolve_entries`].
    pub fn resolve_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .resolve_entries()?
            .into_iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.path)
            .collect())
    }

    /// Resolves only the directory entities.
    ///
    /// # Errors
    ///
    /// See [`FileCollection::resolve_entries`].
    pub fn resolve_directories(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .resolve_entries()?
            .into_iter()
            .filter(|e| e.is_dir)
            .map(|e| e.path)
            .collect())
    }

    /// Pure path-logic membership with all filters applied.
    ///
    /// No filesystem access: this answers for hypothetical paths too,
    /// which is what the task-I/O consistency verifier needs.
    #[must_use]
    pub fn includes(&self, path: &Path, is_dir: bool) -> bool {
        let path = normalize_path(path);
        self.includes_normalized(&path, is_dir)
    }

    fn includes_normalized(&self, path: &Path, is_dir: bool) -> bool {
        match self {
            Self::Empty => false,
            Self::Files(paths) => !is_dir && paths.iter().any(|p| p == path),
            Self::Dir(filter) => filter.includes(path, is_dir),
            Self::Union(parts) => parts.iter().any(|p| p.includes_normalized(path, is_dir)),
        }
    }

    /// The set of paths both collections would accept.
    ///
    /// Symmetric, and filter-aware on both sides: a path is in the
    /// intersection iff each collection would accept it given its roots,
    /// recursion flags, extensions and exclusions. Candidates are drawn
    /// from declared paths and from what currently resolves on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution of either side fails.
    pub fn intersection(&self, other: &Self) -> Result<BTreeSet<PathBuf>> {
        let mut result = BTreeSet::new();
        for (a, b) in [(self, other), (other, self)] {
            for entry in a.resolve_entries()? {
                if b.includes_normalized(&entry.path, entry.is_dir) {
                    result.insert(entry.path);
                }
            }
        }
        Ok(result)
    }
}

/// Whether a basename marks a hidden entry.
#[must_use]
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Normalizes a path to the host separator with `.` segments and
/// trailing separators removed. Comparisons across the engine are
/// string-equality on normalized paths.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

#[cfg(test)]
mod tests;
