// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! The parallel executor.
//!
//! ```text
//! ExecutionPlan groups
//!        |
//!        v  group by group, strictly sequential
//!   +---------------------------+
//!   | parallel: worker pool     |   Actor-1 .. Actor-N
//!   |   flume job queue ------> |   fresh store per task
//!   |   flume results <-------- |   cooperative cancel token
//!   | serial: main worker,      |
//!   |   shared store            |
//!   +---------------------------+
//!        |
//!        v  on the main worker
//!   post_run --> cache updates (single writer)
//!   failure  --> cancel later groups; tear-down still runs
//! ```
//!
//! Workers never touch the cache: results flow back over a channel and
//! the main loop serializes every cache mutation through `post_run`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::{ChangeSet, DartleCache};
use crate::error::{DartleError, MultipleErrors, TaskFailure};
use crate::logging::events::{BuildEvent, BuildListener, BuildStatus, TaskStatus, TracingListener};
use crate::task::graph::TaskGraph;
use crate::task::planner::{ExecutionPlan, TaskGroup};
use crate::task::{Phase, TaskContext, TaskHandler, TaskInvocation, TaskOutcome, TaskResult};

/// Executor knobs derived from options and configuration.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Run group members on isolated workers.
    pub parallel: bool,
    /// Skip all `post_run` cache updates and change-set computation.
    pub disable_cache: bool,
    /// Worker pool size cap for parallel groups.
    pub max_workers: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            disable_cache: false,
            max_workers: 4,
        }
    }
}

/// Aggregate outcome of a run.
#[derive(Debug)]
pub struct BuildResult {
    results: Vec<TaskResult>,
    duration: Duration,
}

impl BuildResult {
    /// Per-invocation results in completion order.
    #[must_use]
    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether every executed task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(TaskResult::is_success)
    }

    /// Folds failures and cancellations into the engine error type:
    /// a single failure stays a task failure (exit 1); several failures,
    /// or a failure plus cancelled tasks, become a joint report (exit 2).
    #[must_use]
    pub fn to_error(&self) -> Option<DartleError> {
        let mut errors: Vec<DartleError> = Vec::new();
        for result in &self.results {
            match result.outcome() {
                TaskOutcome::Success { .. } => {}
                TaskOutcome::Failed { failure } => {
                    errors.push(DartleError::from(failure.clone()));
                }
                TaskOutcome::Cancelled => {
                    errors.push(DartleError::cancelled(result.name()));
                }
            }
        }
        if errors.is_empty() {
            None
        } else {
            Some(MultipleErrors::combined(errors))
        }
    }
}

/// One unit handed to a worker.
struct Job {
    invocation: TaskInvocation,
    handler: TaskHandler,
    changes: Option<ChangeSet>,
}

/// What a worker reports back to the main loop.
struct JobReport {
    invocation: TaskInvocation,
    outcome: Result<(), String>,
    duration: Duration,
}

/// Runs an [`ExecutionPlan`] group by group.
pub struct Executor<'a> {
    graph: &'a TaskGraph,
    cache: &'a DartleCache,
    options: ExecutorOptions,
    listener: Arc<dyn BuildListener>,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub fn new(graph: &'a TaskGraph, cache: &'a DartleCache, options: ExecutorOptions) -> Self {
        Self {
            graph,
            cache,
            options,
            listener: Arc::new(TracingListener),
        }
    }

    /// Replaces the default tracing listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn BuildListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Executes the plan.
    ///
    /// Groups run strictly in order; a failure cancels every not yet
    /// started task except tear-down phase tasks, which run regardless
    /// (until a tear-down task itself fails). Handlers already in flight
    /// are awaited, and their results reported.
    pub async fn execute(&self, plan: &ExecutionPlan) -> BuildResult {
        let started = Instant::now();
        let cancel_token = CancellationToken::new();
        let shared_store = Arc::new(Mutex::new(BTreeMap::new()));
        let mut results: Vec<TaskResult> = Vec::new();
        let mut worker_counter: usize = 0;
        let mut cancelling = false;
        let mut tear_down_failed = false;

        self.emit(BuildEvent::BuildStart {
            task_count: plan.executable_count(),
        });

        let group_count = plan.groups().len();
        for (group_index, group) in plan.groups().iter().enumerate() {
            let tear_down = is_tear_down(group.phase());
            let skip = if tear_down { tear_down_failed } else { cancelling };

            if skip {
                for planned in group.tasks() {
                    self.emit(BuildEvent::TaskEnd {
                        name: planned.name().to_string(),
                        status: TaskStatus::Cancelled,
                        duration: Duration::ZERO,
                    });
                    results.push(TaskResult::new(
                        planned.invocation().clone(),
                        TaskOutcome::Cancelled,
                    ));
                }
                continue;
            }

            let group_results = self
                .run_group(group, &cancel_token, &shared_store, &mut worker_counter)
                .await;

            for result in group_results {
                if !result.is_success() {
                    if tear_down {
                        tear_down_failed = true;
                    }
                    if !cancelling {
                        tracing::debug!(task = %result.name(), "Failure cancels remaining groups");
                        cancelling = true;
                        cancel_token.cancel();
                    }
                }
                results.push(result);
            }

            self.emit(BuildEvent::GroupBoundary {
                group: group_index,
                group_count,
            });
        }

        let duration = started.elapsed();
        let status = if results.iter().all(TaskResult::is_success) {
            BuildStatus::Success
        } else {
            BuildStatus::Failed
        };
        self.emit(BuildEvent::BuildEnd { status, duration });

        BuildResult { results, duration }
    }

    /// Runs the members of one group and returns their results, having
    /// already applied `post_run` for each on the main worker.
    async fn run_group(
        &self,
        group: &TaskGroup,
        cancel_token: &CancellationToken,
        shared_store: &Arc<Mutex<BTreeMap<String, String>>>,
        worker_counter: &mut usize,
    ) -> Vec<TaskResult> {
        let mut results = Vec::new();
        let mut jobs = Vec::new();

        for planned in group.tasks() {
            match self.prepare_job(planned.invocation()) {
                Ok(job) => jobs.push(job),
                Err(failure) => {
                    // Change-set computation failed; the task never runs.
                    self.emit(BuildEvent::Error {
                        kind: "cache",
                        message: failure.to_string(),
                    });
                    results.push(TaskResult::new(
                        planned.invocation().clone(),
                        TaskOutcome::Failed { failure },
                    ));
                }
            }
        }

        let reports = if self.options.parallel {
            self.run_workers(jobs, cancel_token, worker_counter).await
        } else {
            self.run_serial(jobs, cancel_token, shared_store).await
        };

        for report in reports {
            let outcome = match report.outcome {
                Ok(()) => TaskOutcome::Success {
                    duration: report.duration,
                },
                Err(message) => TaskOutcome::Failed {
                    failure: TaskFailure {
                        name: report.invocation.name().to_string(),
                        message,
                    },
                },
            };
            let mut result = TaskResult::new(report.invocation, outcome);
            self.apply_post_run(&mut result);
            self.emit(BuildEvent::TaskEnd {
                name: result.name().to_string(),
                status: if result.is_success() {
                    TaskStatus::Success
                } else {
                    TaskStatus::Failed
                },
                duration: report.duration,
            });
            results.push(result);
        }
        results
    }

    /// Looks the task up and computes its incremental change set.
    fn prepare_job(&self, invocation: &TaskInvocation) -> Result<Job, TaskFailure> {
        let task = self
            .graph
            .get(invocation.name())
            .ok_or_else(|| TaskFailure {
                name: invocation.name().to_string(),
                message: "task disappeared from the graph".to_string(),
            })?
            .task();

        let changes = if self.options.disable_cache {
            None
        } else if let Some((inputs, key)) = task.run_condition().tracked_inputs() {
            Some(
                self.cache
                    .find_changes(inputs, key)
                    .map_err(|e| TaskFailure {
                        name: invocation.name().to_string(),
                        message: format!("{e:#}"),
                    })?,
            )
        } else {
            None
        };

        Ok(Job {
            invocation: invocation.clone(),
            handler: task.handler(),
            changes,
        })
    }

    /// Serial execution on the main worker with the shared store.
    async fn run_serial(
        &self,
        jobs: Vec<Job>,
        cancel_token: &CancellationToken,
        shared_store: &Arc<Mutex<BTreeMap<String, String>>>,
    ) -> Vec<JobReport> {
        let mut reports = Vec::new();
        for job in jobs {
            self.emit(BuildEvent::TaskStart {
                name: job.invocation.name().to_string(),
                args: job.invocation.args().to_vec(),
            });
            let ctx = TaskContext::new(
                job.invocation.args().to_vec(),
                job.changes.clone(),
                cancel_token.clone(),
                "main",
                Arc::clone(shared_store),
            );
            let started = Instant::now();
            let outcome = run_handler(&job.handler, ctx).await;
            reports.push(JobReport {
                invocation: job.invocation,
                outcome,
                duration: started.elapsed(),
            });
        }
        reports
    }

    /// Parallel execution on a worker pool fed through a job queue.
    ///
    /// Each worker has its own `Actor-k` identity; each task gets a
    /// fresh store, so no in-process state crosses task boundaries.
    async fn run_workers(
        &self,
        jobs: Vec<Job>,
        cancel_token: &CancellationToken,
        worker_counter: &mut usize,
    ) -> Vec<JobReport> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let expected = jobs.len();
        let worker_count = self.options.max_workers.max(1).min(expected);
        let (job_tx, job_rx) = flume::unbounded::<Job>();
        let (report_tx, report_rx) = flume::bounded::<JobReport>(expected);

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            *worker_counter += 1;
            let worker_name = format!("Actor-{worker_counter}");
            let job_rx = job_rx.clone();
            let report_tx = report_tx.clone();
            let cancel = cancel_token.clone();
            workers.spawn(async move {
                while let Ok(job) = job_rx.recv_async().await {
                    tracing::trace!(actor = %worker_name, task = %job.invocation, "Worker picked up task");
                    let ctx = TaskContext::new(
                        job.invocation.args().to_vec(),
                        job.changes.clone(),
                        cancel.clone(),
                        worker_name.clone(),
                        Arc::new(Mutex::new(BTreeMap::new())),
                    );
                    let started = Instant::now();
                    let outcome = run_handler(&job.handler, ctx).await;
                    let report = JobReport {
                        invocation: job.invocation,
                        outcome,
                        duration: started.elapsed(),
                    };
                    if report_tx.send_async(report).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(report_tx);

        for job in jobs {
            self.emit(BuildEvent::TaskStart {
                name: job.invocation.name().to_string(),
                args: job.invocation.args().to_vec(),
            });
            // Unbounded queue: this never blocks the main worker.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let mut reports = Vec::new();
        while let Ok(report) = report_rx.recv_async().await {
            reports.push(report);
        }
        while workers.join_next().await.is_some() {}

        if reports.len() != expected {
            tracing::warn!(
                expected,
                received = reports.len(),
                "Worker pool lost task reports"
            );
        }
        reports
    }

    /// Applies the task's `post_run` hook on the main worker. A cache
    /// failure here downgrades a success to a task failure.
    fn apply_post_run(&self, result: &mut TaskResult) {
        if self.options.disable_cache {
            return;
        }
        let Some(task) = self.graph.get(result.name()) else {
            return;
        };
        if let Err(e) = task.task().run_condition().post_run(result, self.cache) {
            let failure = TaskFailure {
                name: result.name().to_string(),
                message: format!("post-run cache update failed: {e:#}"),
            };
            self.emit(BuildEvent::Error {
                kind: "cache",
                message: failure.to_string(),
            });
            *result = TaskResult::new(
                result.invocation().clone(),
                TaskOutcome::Failed { failure },
            );
        }
    }

    fn emit(&self, event: BuildEvent) {
        self.listener.on_event(&event);
    }
}

/// Runs a handler, converting errors and panics into a report-friendly
/// message.
async fn run_handler(handler: &TaskHandler, ctx: TaskContext) -> Result<(), String> {
    match std::panic::AssertUnwindSafe((**handler)(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(format!("{error:#}")),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(format!("handler panicked: {message}"))
        }
    }
}

/// Tear-down band: these tasks run even after earlier failures.
fn is_tear_down(phase: &Phase) -> bool {
    phase.priority() >= Phase::tear_down().priority()
}
