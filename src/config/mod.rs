// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration.
//!
//! # Configuration Hierarchy
//!
//! ```text
//! Priority (low → high)
//! 1. defaults
//! 2. dartle.toml (cwd, optional)
//! 3. DARTLE_* env vars
//! 4. CLI flags
//! ```
//!
//! # Environment Variable Mapping
//!
//! ```text
//! DARTLE_PARALLEL_TASKS=true  → parallel_tasks = true
//! DARTLE_LOG_LEVEL=debug      → log_level = "debug"
//! DARTLE_CACHE_DIR=/some/dir  → cache_dir = "/some/dir"
//! ```

pub mod loader;


use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logging::LogLevel;

/// Default directory the cache persists under.
pub const DEFAULT_CACHE_DIR: &str = ".dartle_tool";

/// Complete engine configuration.
///
/// CLI flags are merged on top of this by the run entry point; a flag
/// always wins over the file and environment sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Run group members on parallel workers.
    pub parallel_tasks: bool,
    /// Console log level.
    pub log_level: LogLevel,
    /// ANSI styling on console output.
    pub color: bool,
    /// Root directory of the incremental cache.
    pub cache_dir: PathBuf,
    /// Bypass all cache reads and writes.
    pub disable_cache: bool,
    /// Cap on concurrently running workers (`None`: number of CPU cores).
    pub max_workers: Option<usize>,
    /// Optional log file receiving `fine`-level output.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel_tasks: false,
            log_level: LogLevel::Info,
            color: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            disable_cache: false,
            max_workers: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Number of workers a parallel group may occupy at once.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        })
    }
}
