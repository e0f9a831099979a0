// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! The incremental build cache.
//!
//! ```text
//! .dartle_tool/
//!   version                     schema version; mismatch wipes the cache
//!   hashes/<H>                  default scope, JSON {path, hash}
//!   hashes/<H>.dir              directory children fingerprint
//!   hashes/D__<key>__D/<H>      keyed scope copies
//!   tasks/<task-name>           latest invocation record {args, timestamp}
//!   bin/<name>                  compiled helper binaries
//! ```
//!
//! `<H>` is the XXH3-128 hex digest of the normalized path, so the cache
//! never mirrors the directory layout of the project. Every entry stores
//! the original path, which is what lets [`DartleCache::find_changes`]
//! enumerate deletions and [`DartleCache::clean`] honor exclusions.
//!
//! The cache is tolerant by construction: a missing entry means "never
//! seen", and the whole root can be deleted at any time. Failures that
//! do surface are typed: persistence problems become
//! [`CacheError`](crate::error::CacheError), collection-resolution
//! problems stay plain I/O errors.

pub mod hashing;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::collection::{FileCollection, FileEntry, normalize_path};
use crate::error::{CacheError, DartleError, DartleResult, io_error};
use hashing::{hash_children, hash_file, hash_path};

/// Cache schema version. Bumping it invalidates existing caches, which
/// rebuild from scratch on `init`.
pub const CACHE_VERSION: &str = "1";

const DIR_SUFFIX: &str = ".dir";

/// A single detected filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    /// Short string representation for log output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// One entity-level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// The changes detected between a collection and its cached fingerprints,
/// sorted lexicographically by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    fn from_changes(mut changes: Vec<Change>) -> Self {
        changes.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.kind.cmp(&b.kind)));
        changes.dedup();
        Self { changes }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Paths with the given change kind, files and directories alike.
    pub fn with_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Persisted per-entity record.
#[derive(Debug, Serialize, Deserialize)]
struct HashEntry {
    path: PathBuf,
    hash: String,
}

/// Persisted latest-invocation record of a task.
#[derive(Debug, Serialize, Deserialize)]
struct InvocationRecord {
    args: Vec<String>,
    timestamp_ms: u64,
}

/// A cache read or write failed on the named file.
fn cache_io(path: &Path, source: std::io::Error) -> DartleError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
    .into()
}

/// A persisted record could not be encoded or decoded.
fn cache_corrupt(path: &Path, message: impl Into<String>) -> DartleError {
    CacheError::Corrupt {
        path: path.display().to_string(),
        message: message.into(),
    }
    .into()
}

/// The content-addressed incremental cache.
///
/// All methods take `&self`: the cache holds no in-memory state, every
/// operation goes straight to disk. Mutations are serialized by the
/// executor, which performs them on the main worker only.
#[derive(Debug, Clone)]
pub struct DartleCache {
    root: PathBuf,
}

impl DartleCache {
    /// Opens (and if needed creates) the cache under `root`.
    ///
    /// An existing cache with a different schema version is wiped and
    /// rebuilt empty.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheError`] if the directory structure cannot be
    /// created.
    pub fn init(root: impl Into<PathBuf>) -> DartleResult<Self> {
        let root = root.into();
        let version_file = root.join("version");

        if root.is_dir() {
            let stored = fs::read_to_string(&version_file).unwrap_or_default();
            if stored.trim() != CACHE_VERSION {
                tracing::debug!(
                    root = %root.display(),
                    found = %stored.trim(),
                    expected = CACHE_VERSION,
                    "Cache version mismatch, rebuilding"
                );
                fs::remove_dir_all(&root).map_err(|e| cache_io(&root, e))?;
            }
        }

        for dir in ["hashes", "tasks", "bin"] {
            let dir = root.join(dir);
            fs::create_dir_all(&dir).map_err(|e| cache_io(&dir, e))?;
        }
        fs::write(&version_file, CACHE_VERSION).map_err(|e| cache_io(&version_file, e))?;

        Ok(Self { root })
    }

    /// A handle that has not touched the disk.
    ///
    /// Used when the cache is bypassed for a run: the planner and
    /// executor hold a cache reference but never call through it, and no
    /// cache directory gets created as a side effect.
    #[must_use]
    pub fn detached(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The canonical location for a compiled helper binary.
    #[must_use]
    pub fn executables_location(&self, file_name: &str) -> PathBuf {
        self.root.join("bin").join(file_name)
    }

    fn scope_dir(&self, key: &str) -> PathBuf {
        let hashes = self.root.join("hashes");
        if key.is_empty() {
            hashes
        } else {
            hashes.join(format!("D__{key}__D"))
        }
    }

    fn entry_file(&self, key: &str, path: &Path, is_dir: bool) -> PathBuf {
        let mut name = hash_path(path);
        if is_dir {
            name.push_str(DIR_SUFFIX);
        }
        self.scope_dir(key).join(name)
    }

    fn read_entry(&self, key: &str, path: &Path, is_dir: bool) -> DartleResult<Option<HashEntry>> {
        let file = self.entry_file(key, path, is_dir);
        if !file.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&file).map_err(|e| cache_io(&file, e))?;
        let entry =
            serde_json::from_slice(&bytes).map_err(|e| cache_corrupt(&file, e.to_string()))?;
        Ok(Some(entry))
    }

    fn write_entry(&self, key: &str, path: &Path, is_dir: bool, hash: String) -> DartleResult<()> {
        let file = self.entry_file(key, path, is_dir);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| cache_io(parent, e))?;
        }
        let entry = HashEntry {
            path: path.to_path_buf(),
            hash,
        };
        let bytes =
            serde_json::to_vec(&entry).map_err(|e| cache_corrupt(&file, e.to_string()))?;
        fs::write(&file, bytes).map_err(|e| cache_io(&file, e))?;
        Ok(())
    }

    fn remove_entry(&self, key: &str, path: &Path, is_dir: bool) -> DartleResult<()> {
        let file = self.entry_file(key, path, is_dir);
        if file.is_file() {
            fs::remove_file(&file).map_err(|e| cache_io(&file, e))?;
        }
        Ok(())
    }

    /// All stored entries of a scope as `(entry file, record, is_dir)`.
    fn scope_entries(&self, key: &str) -> DartleResult<Vec<(PathBuf, HashEntry, bool)>> {
        let dir = self.scope_dir(key);
        let mut entries = Vec::new();
        if !dir.is_dir() {
            return Ok(entries);
        }
        for item in fs::read_dir(&dir).map_err(|e| cache_io(&dir, e))? {
            let item = item.map_err(|e| cache_io(&dir, e))?;
            let is_file = item
                .file_type()
                .map_err(|e| cache_io(&item.path(), e))?
                .is_file();
            if !is_file {
                // Keyed scopes nest under the default scope directory.
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            let is_dir = name.ends_with(DIR_SUFFIX);
            let bytes = fs::read(item.path()).map_err(|e| cache_io(&item.path(), e))?;
            match serde_json::from_slice::<HashEntry>(&bytes) {
                Ok(entry) => entries.push((item.path(), entry, is_dir)),
                Err(e) => {
                    // A torn write is not fatal; the entry just reads as
                    // never-seen after removal.
                    tracing::warn!(entry = %item.path().display(), error = %e, "Dropping corrupt cache entry");
                    fs::remove_file(item.path()).ok();
                }
            }
        }
        Ok(entries)
    }

    fn current_children(path: &Path) -> DartleResult<Vec<(String, bool)>> {
        let mut children = Vec::new();
        for item in fs::read_dir(path).map_err(|e| cache_io(path, e))? {
            let item = item.map_err(|e| cache_io(path, e))?;
            children.push((
                item.file_name().to_string_lossy().into_owned(),
                item.file_type()
                    .map_err(|e| cache_io(&item.path(), e))?
                    .is_dir(),
            ));
        }
        children.sort();
        Ok(children)
    }

    fn fingerprint_on_disk(entry: &FileEntry) -> DartleResult<Option<String>> {
        if entry.is_dir {
            if entry.path.is_dir() {
                let children = Self::current_children(&entry.path)?;
                Ok(Some(hash_children(&children)))
            } else {
                Ok(None)
            }
        } else if entry.path.is_file() {
            Ok(Some(
                hash_file(&entry.path).map_err(|e| cache_io(&entry.path, e))?,
            ))
        } else {
            Ok(None)
        }
    }

    /// Hashes everything the collection resolves to and records it under
    /// `key`.
    ///
    /// Entities that no longer exist on disk have their records removed,
    /// so a fresh `cache` always leaves [`DartleCache::has_changed`]
    /// reporting `false` for the same collection and key.
    ///
    /// # Errors
    ///
    /// Returns an error on resolution or I/O failure.
    pub fn cache(&self, collection: &FileCollection, key: &str) -> DartleResult<()> {
        for entry in collection.resolve_entries().map_err(io_error)? {
            match Self::fingerprint_on_disk(&entry)? {
                Some(hash) => self.write_entry(key, &entry.path, entry.is_dir, hash)?,
                None => self.remove_entry(key, &entry.path, entry.is_dir)?,
            }
        }
        Ok(())
    }

    /// Whether anything in the collection differs from its recorded
    /// fingerprints under `key`.
    ///
    /// An empty collection is always unchanged. Entities never seen
    /// before count as changed when present on disk and unchanged when
    /// absent; previously recorded entities count as changed when gone.
    ///
    /// # Errors
    ///
    /// Returns an error on resolution or I/O failure.
    pub fn has_changed(&self, collection: &FileCollection, key: &str) -> DartleResult<bool> {
        Ok(!self.find_changes(collection, key)?.is_empty())
    }

    /// Enumerates added, modified and deleted entities at file and
    /// directory granularity. Does not mutate the cache: calling it twice
    /// without filesystem changes in between yields the same result.
    ///
    /// # Errors
    ///
    /// Returns an error on resolution or I/O failure.
    pub fn find_changes(&self, collection: &FileCollection, key: &str) -> DartleResult<ChangeSet> {
        let resolved = collection.resolve_entries().map_err(io_error)?;
        let mut changes = Vec::new();
        let mut seen: BTreeSet<(PathBuf, bool)> = BTreeSet::new();

        for entry in resolved {
            seen.insert((entry.path.clone(), entry.is_dir));
            let on_disk = Self::fingerprint_on_disk(&entry)?;
            let recorded = self.read_entry(key, &entry.path, entry.is_dir)?;
            let kind = match (recorded, on_disk) {
                (None, Some(_)) => Some(ChangeKind::Added),
                (Some(old), Some(new)) if old.hash != new => Some(ChangeKind::Modified),
                (Some(_), None) => Some(ChangeKind::Deleted),
                _ => None,
            };
            if let Some(kind) = kind {
                changes.push(Change {
                    kind,
                    path: entry.path,
                    is_dir: entry.is_dir,
                });
            }
        }

        // Recorded entities the collection still claims but that are gone
        // from disk: deletions under directory roots that resolution can
        // no longer see.
        for (_, record, is_dir) in self.scope_entries(key)? {
            let path = normalize_path(&record.path);
            if seen.contains(&(path.clone(), is_dir)) {
                continue;
            }
            if !collection.includes(&path, is_dir) {
                continue;
            }
            let gone = if is_dir {
                !path.is_dir()
            } else {
                !path.is_file()
            };
            if gone {
                changes.push(Change {
                    kind: ChangeKind::Deleted,
                    path,
                    is_dir,
                });
            }
        }

        Ok(ChangeSet::from_changes(changes))
    }

    /// Whether a fingerprint is recorded for `path` under `key`.
    #[must_use]
    pub fn contains(&self, path: &Path, is_dir: bool, key: &str) -> bool {
        self.entry_file(key, &normalize_path(path), is_dir).is_file()
    }

    /// Deletes all recorded fingerprints for entities of the collection
    /// under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error on resolution or I/O failure.
    pub fn remove(&self, collection: &FileCollection, key: &str) -> DartleResult<()> {
        for entry in collection.resolve_entries().map_err(io_error)? {
            self.remove_entry(key, &entry.path, entry.is_dir)?;
        }
        // Records of entities that resolution no longer reaches.
        for (file, record, is_dir) in self.scope_entries(key)? {
            if collection.includes(&normalize_path(&record.path), is_dir) {
                fs::remove_file(&file).map_err(|e| cache_io(&file, e))?;
            }
        }
        Ok(())
    }

    /// Wipes recorded fingerprints.
    ///
    /// With a `key`, only that scope is cleaned; otherwise every scope
    /// and all task-invocation records go. Entities matched by
    /// `exclusions` survive either way.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn clean(&self, key: Option<&str>, exclusions: &FileCollection) -> DartleResult<()> {
        let keys = match key {
            Some(k) => vec![k.to_string()],
            None => {
                let mut all = self.known_keys()?;
                all.insert(0, String::new());
                all
            }
        };

        for scope_key in &keys {
            for (file, record, is_dir) in self.scope_entries(scope_key)? {
                if exclusions.includes(&normalize_path(&record.path), is_dir) {
                    continue;
                }
                fs::remove_file(&file).map_err(|e| cache_io(&file, e))?;
            }
            // A fully drained keyed scope leaves no directory behind.
            if !scope_key.is_empty() {
                let dir = self.scope_dir(scope_key);
                if dir.is_dir() {
                    let drained = fs::read_dir(&dir)
                        .map_err(|e| cache_io(&dir, e))?
                        .next()
                        .is_none();
                    if drained {
                        fs::remove_dir(&dir).map_err(|e| cache_io(&dir, e))?;
                    }
                }
            }
        }

        if key.is_none() {
            let tasks = self.root.join("tasks");
            if tasks.is_dir() {
                for item in fs::read_dir(&tasks).map_err(|e| cache_io(&tasks, e))? {
                    let item = item.map_err(|e| cache_io(&tasks, e))?;
                    fs::remove_file(item.path()).map_err(|e| cache_io(&item.path(), e))?;
                }
            }
        }
        Ok(())
    }

    /// All keyed scopes currently present on disk.
    fn known_keys(&self) -> DartleResult<Vec<String>> {
        let hashes = self.root.join("hashes");
        let mut keys = Vec::new();
        if !hashes.is_dir() {
            return Ok(keys);
        }
        for item in fs::read_dir(&hashes).map_err(|e| cache_io(&hashes, e))? {
            let item = item.map_err(|e| cache_io(&hashes, e))?;
            let is_dir = item
                .file_type()
                .map_err(|e| cache_io(&item.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            if let Some(key) = name
                .strip_prefix("D__")
                .and_then(|rest| rest.strip_suffix("__D"))
            {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn task_file(&self, name: &str) -> PathBuf {
        self.root.join("tasks").join(name)
    }

    /// Records `(args, now)` as the latest successful invocation of the
    /// named task.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn cache_task_invocation(&self, name: &str, args: &[String]) -> DartleResult<()> {
        let record = InvocationRecord {
            args: args.to_vec(),
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        };
        let file = self.task_file(name);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| cache_io(parent, e))?;
        }
        let bytes =
            serde_json::to_vec(&record).map_err(|e| cache_corrupt(&file, e.to_string()))?;
        fs::write(&file, bytes).map_err(|e| cache_io(&file, e))?;
        Ok(())
    }

    fn read_invocation(&self, name: &str) -> DartleResult<Option<InvocationRecord>> {
        let file = self.task_file(name);
        if !file.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&file).map_err(|e| cache_io(&file, e))?;
        let record =
            serde_json::from_slice(&bytes).map_err(|e| cache_corrupt(&file, e.to_string()))?;
        Ok(Some(record))
    }

    /// Whether the given args differ from the last recorded invocation.
    ///
    /// Args are compared as ordered sequences: `[a, b]` and `[b, a]` are
    /// different invocations. A task never recorded counts as changed.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn has_task_invocation_changed(&self, name: &str, args: &[String]) -> DartleResult<bool> {
        Ok(match self.read_invocation(name)? {
            Some(record) => record.args != args,
            None => true,
        })
    }

    /// The timestamp of the last recorded invocation, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn latest_invocation_time(&self, name: &str) -> DartleResult<Option<SystemTime>> {
        Ok(self
            .read_invocation(name)?
            .map(|record| UNIX_EPOCH + Duration::from_millis(record.timestamp_ms)))
    }

    /// Deletes the invocation record of the named task.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn remove_task_invocation(&self, name: &str) -> DartleResult<()> {
        let file = self.task_file(name);
        if file.is_file() {
            fs::remove_file(&file).map_err(|e| cache_io(&file, e))?;
        }
        Ok(())
    }

    /// Garbage-collects records against the live task and key sets:
    /// invocation records of unknown tasks and whole scopes of unknown
    /// keys are removed, bounding disk growth across build script edits.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn remove_not_matching(
        &self,
        task_names: &BTreeSet<String>,
        keys: &BTreeSet<String>,
    ) -> DartleResult<()> {
        let tasks = self.root.join("tasks");
        if tasks.is_dir() {
            for item in fs::read_dir(&tasks).map_err(|e| cache_io(&tasks, e))? {
                let item = item.map_err(|e| cache_io(&tasks, e))?;
                let name = item.file_name().to_string_lossy().into_owned();
                if !task_names.contains(&name) {
                    tracing::debug!(task = %name, "Dropping stale invocation record");
                    fs::remove_file(item.path()).map_err(|e| cache_io(&item.path(), e))?;
                }
            }
        }
        for key in self.known_keys()? {
            if !keys.contains(&key) {
                tracing::debug!(key = %key, "Dropping stale cache scope");
                let dir = self.scope_dir(&key);
                fs::remove_dir_all(&dir).map_err(|e| cache_io(&dir, e))?;
            }
        }
        Ok(())
    }
}
