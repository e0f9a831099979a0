// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Library root.
//!
//! # Crate Architecture
//!
//! ```text
//!                 user build script main()
//!                           |
//!                           v
//!                     run (entry point)
//!                     cli (clap options)
//!                           |
//!              +------------+------------+
//!              v            v            v
//!            task        planner      executor
//!       graph/invocation  groups    workers, cancel
//!              |            |            |
//!              +-----+------+-----+------+
//!                    v            v
//!               condition       cache
//!             should/post    hashes, keys,
//!                run         change detection
//!                    |            |
//!                    +-----+------+
//!                          v
//!                     collection
//!                files/dirs/filters
//!
//!   +-----------------------------------------+
//!   |  foundation   error, logging, config    |
//!   +-----------------------------------------+
//! ```
//!
//! A build script declares [`Task`]s and hands them to [`run`]:
//!
//! ```no_run
//! use dartle::{run, FileCollection, RunCondition, Task};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let encode = Task::new("encode", |ctx| async move {
//!         // read inputs, write outputs...
//!         Ok(())
//!     })
//!     .with_run_condition(RunCondition::on_changes(
//!         FileCollection::file("source.txt"),
//!         FileCollection::file("out.txt"),
//!     ))
//!     .with_default(true);
//!
//!     run(std::env::args().skip(1), vec![encode]).await
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod collection;
pub mod condition;
pub mod config;
pub mod error;
pub mod logging;
pub mod run;
pub mod task;

pub use cache::{Change, ChangeKind, ChangeSet, DartleCache};
pub use collection::{FileCollection, FileEntry};
pub use condition::RunCondition;
pub use error::{DartleError, DartleResult, Result};
pub use run::{run, run_with_phases, try_run};
pub use task::{
    ArgsValidator, Phase, PhaseRegistry, Task, TaskContext, TaskInvocation, TaskOutcome,
    TaskResult,
};
