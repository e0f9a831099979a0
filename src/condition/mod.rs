// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Run conditions: the predicates deciding whether a scheduled task
//! actually executes.
//!
//! ```text
//! RunCondition
//!   Always | OnChanges{ins, outs} | AtMostEvery(period)
//!   ToDelete(targets) | And[...] | Or[...]
//!        |
//!        v
//!   should_run(invocation, cache) --> bool
//!   post_run(result, cache)       --> cache updates on success
//! ```
//!
//! Conditions are plain tagged variants; the cache handle is passed into
//! each call instead of being captured, which keeps conditions cheap to
//! clone and keeps all cache writes on the executor's main worker.

use std::time::{Duration, SystemTime};

use crate::cache::DartleCache;
use crate::collection::FileCollection;
use crate::error::Result;
use crate::task::{TaskInvocation, TaskResult};

/// Decides whether a scheduled invocation executes, and updates the
/// cache after it ran.
#[derive(Debug, Clone)]
pub enum RunCondition {
    /// Unconditionally runs. The default for tasks.
    Always,

    /// Runs iff inputs or outputs changed since the last successful run,
    /// or a declared output is missing on disk.
    ///
    /// With both collections empty the task never runs; declare at least
    /// one side to get incremental behavior.
    OnChanges {
        inputs: FileCollection,
        outputs: FileCollection,
        /// Cache scope for the fingerprints. Tasks sharing inputs can
        /// keep independent records by using distinct keys.
        key: String,
    },

    /// Runs iff the invocation fingerprint changed, no previous run is
    /// recorded, or at least `period` has passed since the last one.
    AtMostEvery(Duration),

    /// Runs iff any target still exists on disk. The handler is expected
    /// to delete the targets; `post_run` records nothing.
    ToDelete(FileCollection),

    /// Runs iff every child condition says so (short-circuit).
    And(Vec<RunCondition>),

    /// Runs iff any child condition says so (short-circuit).
    Or(Vec<RunCondition>),
}

impl Default for RunCondition {
    fn default() -> Self {
        Self::Always
    }
}

impl RunCondition {
    /// Incremental condition over input and output collections, default
    /// cache scope.
    #[must_use]
    pub const fn on_changes(inputs: FileCollection, outputs: FileCollection) -> Self {
        Self::OnChanges {
            inputs,
            outputs,
            key: String::new(),
        }
    }

    /// Incremental condition with a dedicated cache scope.
    pub fn on_changes_keyed(
        inputs: FileCollection,
        outputs: FileCollection,
        key: impl Into<String>,
    ) -> Self {
        Self::OnChanges {
            inputs,
            outputs,
            key: key.into(),
        }
    }

    /// Whether the invocation should actually execute.
    ///
    /// # Errors
    ///
    /// Propagates cache and filesystem errors; the planner converts them
    /// into a failure of the task they belong to.
    pub fn should_run(&self, invocation: &TaskInvocation, cache: &DartleCache) -> Result<bool> {
        match self {
            Self::Always => Ok(true),
            Self::OnChanges {
                inputs,
                outputs,
                key,
            } => {
                if inputs.is_empty() && outputs.is_empty() {
                    // Nothing declared means nothing can ever change.
                    return Ok(false);
                }
                if cache.has_changed(inputs, key)? || cache.has_changed(outputs, key)? {
                    return Ok(true);
                }
                any_output_missing(outputs)
            }
            Self::AtMostEvery(period) => {
                if cache.has_task_invocation_changed(invocation.name(), invocation.args())? {
                    return Ok(true);
                }
                match cache.latest_invocation_time(invocation.name())? {
                    None => Ok(true),
                    Some(last) => {
                        let elapsed = SystemTime::now()
                            .duration_since(last)
                            .unwrap_or(Duration::ZERO);
                        Ok(elapsed >= *period)
                    }
                }
            }
            Self::ToDelete(targets) => {
                for entry in targets.resolve_entries()? {
                    let exists = if entry.is_dir {
                        entry.path.is_dir()
                    } else {
                        entry.path.is_file()
                    };
                    if exists {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::And(children) => {
                for child in children {
                    if !child.should_run(invocation, cache)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(children) => {
                for child in children {
                    if child.should_run(invocation, cache)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Updates the cache after the task terminated.
    ///
    /// Only successful results touch the cache; failures leave the
    /// previous fingerprints in place so the task reruns next time.
    ///
    /// # Errors
    ///
    /// Propagates cache and filesystem errors.
    pub fn post_run(&self, result: &TaskResult, cache: &DartleCache) -> Result<()> {
        match self {
            Self::Always | Self::ToDelete(_) => Ok(()),
            Self::OnChanges {
                inputs,
                outputs,
                key,
            } => {
                if result.is_success() {
                    cache.cache(inputs, key)?;
                    cache.cache(outputs, key)?;
                }
                Ok(())
            }
            Self::AtMostEvery(_) => {
                if result.is_success() {
                    cache.cache_task_invocation(
                        result.invocation().name(),
                        result.invocation().args(),
                    )?;
                }
                Ok(())
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.post_run(result, cache)?;
                }
                Ok(())
            }
        }
    }

    /// Whether this condition can ever skip a run. Used by `--show-tasks`
    /// to tag tasks that always execute.
    #[must_use]
    pub fn always_runs(&self) -> bool {
        match self {
            Self::Always => true,
            Self::OnChanges { .. } | Self::AtMostEvery(_) | Self::ToDelete(_) => false,
            Self::And(children) => children.iter().all(Self::always_runs),
            Self::Or(children) => children.iter().any(Self::always_runs),
        }
    }

    /// The input collection incremental change sets are computed from,
    /// when this condition tracks one.
    #[must_use]
    pub fn tracked_inputs(&self) -> Option<(&FileCollection, &str)> {
        match self {
            Self::OnChanges { inputs, key, .. } => Some((inputs, key)),
            Self::And(children) | Self::Or(children) => {
                children.iter().find_map(Self::tracked_inputs)
            }
            _ => None,
        }
    }

    /// Every `OnChanges` leaf of this condition as `(inputs, outputs)`
    /// pairs, descending through `And`/`Or` combinators the same way
    /// [`RunCondition::tracked_inputs`] and
    /// [`RunCondition::collect_cache_keys`] do. Task-I/O verification
    /// iterates these, so a collection wrapped in a combinator declares
    /// its files exactly like a bare one.
    #[must_use]
    pub fn on_changes_leaves(&self) -> Vec<(&FileCollection, &FileCollection)> {
        let mut leaves = Vec::new();
        self.push_on_changes_leaves(&mut leaves);
        leaves
    }

    fn push_on_changes_leaves<'a>(
        &'a self,
        out: &mut Vec<(&'a FileCollection, &'a FileCollection)>,
    ) {
        match self {
            Self::OnChanges {
                inputs, outputs, ..
            } => out.push((inputs, outputs)),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.push_on_changes_leaves(out);
                }
            }
            Self::Always | Self::AtMostEvery(_) | Self::ToDelete(_) => {}
        }
    }

    /// The deletion targets of a [`RunCondition::ToDelete`] condition.
    #[must_use]
    pub const fn deletion_targets(&self) -> Option<&FileCollection> {
        match self {
            Self::ToDelete(targets) => Some(targets),
            _ => None,
        }
    }

    /// Collects every cache key this condition stores fingerprints
    /// under, for garbage collection against the live key set.
    pub fn collect_cache_keys(&self, keys: &mut std::collections::BTreeSet<String>) {
        match self {
            Self::OnChanges { key, .. } => {
                keys.insert(key.clone());
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_cache_keys(keys);
                }
            }
            Self::Always | Self::AtMostEvery(_) | Self::ToDelete(_) => {}
        }
    }
}

/// Whether any declared output entity is absent from disk.
fn any_output_missing(outputs: &FileCollection) -> Result<bool> {
    for entry in outputs.resolve_entries()? {
        let present = if entry.is_dir {
            entry.path.is_dir()
        } else {
            entry.path.is_file()
        };
        if !present {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests;
