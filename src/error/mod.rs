// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Error handling module.
//!
//! ```text
//!             DartleError (boxed payloads)
//!                      |
//!    +------+------+---+---+--------+-------+
//!    |      |      |       |        |       |
//!    v      v      v       v        v       v
//!  Invoc  Graph  Task  Multiple  Option  Cache Io
//!
//! Sub-errors (unboxed internally):
//!   Invocation  ArgumentBeforeTask, TaskDoesNotExist,
//!               InvalidArgs, NothingToRun, Several
//!   Graph       MissingDependency, Cycle, PhaseViolations,
//!               MustDependOn, DeleteTaskPhase
//!   Cache       Io, Corrupt
//!
//! exit_code():  1 invocation/task/cache
//!               2 multiple errors or cancellation
//!               4 unknown option
//! ```

use thiserror::Error;

/// Convenience alias for `anyhow::Result`, used by task handlers and
/// internal plumbing.
pub type Result<T> = anyhow::Result<T>;

/// Result type using [`DartleError`].
pub type DartleResult<T> = std::result::Result<T, DartleError>;

/// Top-level engine error type.
///
/// All sub-errors are boxed to keep this enum small on the stack.
#[derive(Debug, Error)]
pub enum DartleError {
    /// Parser or validator failure.
    #[error("Invocation problem: {0}")]
    Invocation(#[from] Box<InvocationError>),

    /// Task graph construction or verification failure.
    #[error("Invocation problem: {0}")]
    Graph(#[from] Box<GraphError>),

    /// A task handler failed.
    #[error("{0}")]
    Task(#[from] Box<TaskFailure>),

    /// Several tasks failed, or failed and were cancelled.
    #[error("{0}")]
    Multiple(#[from] Box<MultipleErrors>),

    /// Unknown command-line option.
    #[error("{0}")]
    Option(#[from] Box<OptionError>),

    /// A task was cancelled before it started.
    #[error("Task '{0}' was cancelled")]
    Cancelled(Box<str>),

    /// I/O failure reading or writing the cache.
    #[error("cache error: {0}")]
    Cache(#[from] Box<CacheError>),

    /// I/O error outside the cache.
    #[error("io error: {0}")]
    Io(Box<std::io::Error>),
}

impl DartleError {
    /// Maps this error to the process exit code of the run.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Invocation(_)
            | Self::Graph(_)
            | Self::Task(_)
            | Self::Cache(_)
            | Self::Io(_) => 1,
            Self::Multiple(_) | Self::Cancelled(_) => 2,
            Self::Option(_) => 4,
        }
    }

    /// Creates a cancellation report for the named task.
    pub fn cancelled(task: impl Into<String>) -> Self {
        Self::Cancelled(task.into().into_boxed_str())
    }
}

// --- From implementations for boxing ---

/// Macro to generate `From` implementations that box the source error.
macro_rules! impl_from_boxed {
    ($($error:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$error> for DartleError {
                fn from(err: $error) -> Self {
                    DartleError::$variant(Box::new(err))
                }
            }
        )+
    };
}

impl_from_boxed! {
    InvocationError => Invocation,
    GraphError => Graph,
    TaskFailure => Task,
    MultipleErrors => Multiple,
    OptionError => Option,
    CacheError => Cache,
    std::io::Error => Io,
}

// --- Invocation errors ---

/// Command-line invocation errors from the parser and args validators.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// A `:arg` token appeared before any task name.
    #[error("Argument should follow a task: ':{arg}'")]
    ArgumentBeforeTask { arg: String },

    /// A selected task name is not declared.
    ///
    /// `suggestion` carries the closest declared name by word-prefix
    /// similarity, when one exists. It is logged, not displayed, so the
    /// canonical message stays stable.
    #[error("Task '{name}' does not exist")]
    TaskDoesNotExist {
        name: String,
        suggestion: Option<String>,
    },

    /// The args validator of a task rejected the given arguments.
    #[error("Invalid arguments for task '{task}': [{}] - {reason}", .args.join(", "))]
    InvalidArgs {
        task: String,
        args: Vec<String>,
        reason: String,
    },

    /// No tasks were named and no task is marked as default.
    #[error("No tasks were selected and no task is marked as default")]
    NothingToRun,

    /// A recognized option was given an unusable value.
    #[error("{message}")]
    BadOptionValue { message: String },

    /// More than one problem was found; all are reported together.
    #[error("Several invocation problems found:{}", format_list(.0))]
    Several(Vec<InvocationError>),
}

impl InvocationError {
    /// Collapses a non-empty list of problems into a single error.
    ///
    /// A single problem is returned as-is; two or more are wrapped in
    /// [`InvocationError::Several`].
    #[must_use]
    pub fn combined(mut problems: Vec<Self>) -> Self {
        if problems.len() == 1 {
            problems.remove(0)
        } else {
            Self::Several(problems)
        }
    }
}

// --- Graph errors ---

/// Task graph construction and verification errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A task name is empty.
    #[error("Task name cannot be empty")]
    EmptyTaskName,

    /// Two declared tasks share a name.
    #[error("More than one task with name '{name}'")]
    DuplicateTask { name: String },

    /// A `depends_on` entry does not resolve to a declared task.
    #[error("Task with name '{name}' does not exist (dependency path: [{}])", .path.join(" -> "))]
    MissingDependency { name: String, path: Vec<String> },

    /// The dependency walk closed on itself.
    #[error("Task dependency cycle detected: [{}]", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A task uses a custom phase that was never registered for the run.
    #[error("Task '{task}' uses unregistered phase '{phase}'")]
    UnknownPhase { task: String, phase: String },

    /// Tasks depending on tasks in a later phase; all violations are
    /// collected and reported together.
    #[error("Task phase inconsistencies found:{}", format_list(.0))]
    PhaseViolations(Vec<PhaseViolation>),

    /// Two tasks share files without a dependency between them.
    #[error("Task '{task}' must dependOn '{dependency}' (clashing outputs: {{{}}})", .clashing.join(", "))]
    MustDependOn {
        task: String,
        dependency: String,
        clashing: Vec<String>,
    },

    /// A deletion task targets files of a task whose phase is not later.
    #[error(
        "Task '{delete_task}' (phase '{delete_phase}') deletes inputs/outputs of task \
         '{task}' (phase '{task_phase}') so it must run in an earlier phase"
    )]
    DeleteTaskPhase {
        delete_task: String,
        delete_phase: String,
        task: String,
        task_phase: String,
    },
}

/// One phase-ordering violation: a task depending on a later-phase task.
#[derive(Debug, Error)]
#[error("Task '{task}' (phase '{task_phase}') cannot depend on task '{dependency}' (phase '{dependency_phase}')")]
pub struct PhaseViolation {
    pub task: String,
    pub task_phase: String,
    pub dependency: String,
    pub dependency_phase: String,
}

// --- Task failures ---

/// A task handler returned an error.
///
/// The original handler error chain is flattened into `message` for
/// reporting; the executor logs the full chain at debug level.
#[derive(Debug, Clone, Error)]
#[error("Task '{name}' failed: {message}")]
pub struct TaskFailure {
    pub name: String,
    pub message: String,
}

impl TaskFailure {
    /// Builds a failure record from a handler error, keeping the full
    /// context chain in the message.
    pub fn from_handler(name: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            name: name.into(),
            message: format!("{error:#}"),
        }
    }
}

// --- Multiple errors ---

/// Several errors from one run, reported under a common header.
#[derive(Debug, Error)]
#[error("Several errors have occurred:{}", format_list(.errors))]
pub struct MultipleErrors {
    pub errors: Vec<DartleError>,
}

impl MultipleErrors {
    /// Collapses a non-empty error list: one error is returned unchanged,
    /// two or more become a [`MultipleErrors`].
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty.
    #[must_use]
    pub fn combined(mut errors: Vec<DartleError>) -> DartleError {
        assert!(!errors.is_empty(), "combined() requires at least one error");
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            DartleError::from(Self { errors })
        }
    }
}

// --- Option errors ---

/// An unrecognized command-line option.
#[derive(Debug, Error)]
#[error("Unknown option: '{option}'")]
pub struct OptionError {
    pub option: String,
    pub suggestion: Option<String>,
}

// --- Cache errors ---

/// Cache persistence errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a cache file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted entry could not be decoded.
    #[error("corrupt cache entry '{path}': {message}")]
    Corrupt { path: String, message: String },
}

/// Converts a collection-resolution failure into the engine error type,
/// preserving a real I/O error when one is the cause.
pub(crate) fn io_error(error: anyhow::Error) -> DartleError {
    match error.downcast::<std::io::Error>() {
        Ok(io) => DartleError::Io(Box::new(io)),
        Err(other) => DartleError::Io(Box::new(std::io::Error::other(format!("{other:#}")))),
    }
}

/// Renders `items` as an indented, one-per-line list for multi-error
/// messages.
fn format_list<T: std::fmt::Display>(items: &[T]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str("\n  - ");
        out.push_str(&item.to_string());
    }
    out
}
