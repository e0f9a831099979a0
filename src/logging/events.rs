// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Structured build lifecycle events.
//!
//! The executor emits these through a [`BuildListener`]; the default
//! listener renders them with `tracing`. External front-ends can install
//! their own listener to take over presentation entirely.

use std::time::Duration;

/// Final status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The handler returned without error.
    Success,
    /// The handler returned an error.
    Failed,
    /// The task was cancelled before it started.
    Cancelled,
}

impl TaskStatus {
    /// Short string representation for log output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Final status of the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Failed,
}

/// Lifecycle events emitted by the executor.
#[derive(Debug)]
pub enum BuildEvent {
    /// The run is starting with the given number of executable tasks.
    BuildStart { task_count: usize },
    /// A task handler is about to run.
    TaskStart { name: String, args: Vec<String> },
    /// A task has terminated.
    TaskEnd {
        name: String,
        status: TaskStatus,
        duration: Duration,
    },
    /// A parallel group has fully terminated.
    GroupBoundary { group: usize, group_count: usize },
    /// The run is over.
    BuildEnd {
        status: BuildStatus,
        duration: Duration,
    },
    /// An error event carrying the §-taxonomy kind as a stable string.
    Error { kind: &'static str, message: String },
}

/// Consumer of build lifecycle events.
///
/// Implementations must be cheap: events are emitted from the executor's
/// main loop between task completions.
pub trait BuildListener: Send + Sync {
    fn on_event(&self, event: &BuildEvent);
}

/// Default listener rendering events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl BuildListener for TracingListener {
    fn on_event(&self, event: &BuildEvent) {
        match event {
            BuildEvent::BuildStart { task_count } => {
                tracing::debug!(task_count, "Build starting");
            }
            BuildEvent::TaskStart { name, args } => {
                if args.is_empty() {
                    tracing::info!(task = %name, "Running task");
                } else {
                    tracing::info!(task = %name, args = ?args, "Running task");
                }
            }
            BuildEvent::TaskEnd {
                name,
                status,
                duration,
            } => match status {
                TaskStatus::Success => {
                    tracing::info!(task = %name, duration_ms = duration.as_millis() as u64, "Task succeeded");
                }
                TaskStatus::Failed => {
                    tracing::error!(task = %name, duration_ms = duration.as_millis() as u64, "Task failed");
                }
                TaskStatus::Cancelled => {
                    tracing::warn!(task = %name, "Task '{name}' was cancelled");
                }
            },
            BuildEvent::GroupBoundary { group, group_count } => {
                tracing::debug!(group = group + 1, total = group_count, "Group finished");
            }
            BuildEvent::BuildEnd { status, duration } => match status {
                BuildStatus::Success => {
                    tracing::info!(duration_ms = duration.as_millis() as u64, "Build succeeded");
                }
                BuildStatus::Failed => {
                    tracing::error!(duration_ms = duration.as_millis() as u64, "Build failed");
                }
            },
            BuildEvent::Error { kind, message } => {
                tracing::error!(kind, "{message}");
            }
        }
    }
}
