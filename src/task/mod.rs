// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! The task model and execution pipeline.
//!
//! # Architecture
//!
//! ```text
//!  user build script
//!        |
//!        v
//!      Task ----- handler, depends_on, RunCondition,
//!        |        ArgsValidator, Phase
//!        v
//!    TaskGraph ----> TaskWithDeps (closures, verification)
//!        |
//!        v
//!  InvocationParser  argv --> [TaskInvocation]
//!        |
//!        v
//!     Planner ----> ExecutionPlan (parallel groups per phase)
//!        |
//!        v
//!     Executor ----> TaskResult*  (workers, cancellation, post-run)
//! ```
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Task`] | Named unit of work with handler and scheduling metadata |
//! | [`Phase`] | Priority-ordered execution band (setup/build/tear-down) |
//! | [`PhaseRegistry`] | Per-run registry of known phases |
//! | [`ArgsValidator`] | Accepts or rejects per-task CLI arguments |
//! | [`TaskInvocation`] | `(name, args)` pair selected for execution |
//! | [`TaskContext`] | What a handler sees: args, changes, cancellation |
//! | [`TaskResult`] | Terminal outcome of one invocation |

pub mod executor;
pub mod graph;
pub mod invocation;
pub mod planner;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::cache::ChangeSet;
use crate::condition::RunCondition;
use crate::error::{GraphError, Result, TaskFailure};

/// An execution band. Tasks only start after every task of all
/// earlier-priority phases has terminated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phase {
    priority: i32,
    name: String,
}

impl Phase {
    /// The built-in setup phase (priority 100).
    #[must_use]
    pub fn setup() -> Self {
        Self::custom(100, "setup")
    }

    /// The built-in build phase (priority 500), the default for tasks.
    #[must_use]
    pub fn build() -> Self {
        Self::custom(500, "build")
    }

    /// The built-in tear-down phase (priority 1000). Tear-down tasks run
    /// even after earlier failures, like a `finally` clause.
    #[must_use]
    pub fn tear_down() -> Self {
        Self::custom(1000, "tearDown")
    }

    /// A user-defined phase. Must be registered on the run's
    /// [`PhaseRegistry`] before tasks may use it.
    pub fn custom(priority: i32, name: impl Into<String>) -> Self {
        Self {
            priority,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this phase runs strictly before `other`.
    #[must_use]
    pub const fn is_before(&self, other: &Self) -> bool {
        self.priority < other.priority
    }

    /// Whether this phase runs strictly after `other`.
    #[must_use]
    pub const fn is_after(&self, other: &Self) -> bool {
        self.priority > other.priority
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::build()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// The phases known to one run.
///
/// The registry is owned by the execution context and threaded through
/// graph construction and planning. Registering a custom phase in one run
/// never leaks into another.
#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    phases: Vec<Phase>,
}

impl PhaseRegistry {
    /// A registry holding the three built-in phases.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phases: vec![Phase::setup(), Phase::build(), Phase::tear_down()],
        }
    }

    /// Registers a custom phase.
    ///
    /// # Errors
    ///
    /// Fails if another phase already uses the same name or priority.
    pub fn register(&mut self, phase: Phase) -> Result<()> {
        if let Some(existing) = self
            .phases
            .iter()
            .find(|p| p.name == phase.name || p.priority == phase.priority)
        {
            anyhow::bail!(
                "phase '{}' (priority {}) clashes with existing phase '{}' (priority {})",
                phase.name,
                phase.priority,
                existing.name,
                existing.priority
            );
        }
        self.phases.push(phase);
        self.phases.sort_by_key(Phase::priority);
        Ok(())
    }

    /// All registered phases in priority order.
    #[must_use]
    pub fn all(&self) -> &[Phase] {
        &self.phases
    }

    /// Looks a phase up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Whether the phase is known to this run.
    #[must_use]
    pub fn contains(&self, phase: &Phase) -> bool {
        self.phases.contains(phase)
    }
}

impl Default for PhaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts or rejects the arguments given to a task on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsValidator {
    /// Any number of arguments is fine.
    AcceptAny,
    /// Exactly `n` arguments are required.
    Count(usize),
    /// Between `min` and `max` arguments (inclusive) are required.
    Range { min: usize, max: usize },
}

impl Default for ArgsValidator {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl ArgsValidator {
    /// Validates an argument list, returning the canonical complaint on
    /// rejection.
    ///
    /// # Errors
    ///
    /// Returns the expectation message when the arity does not match.
    pub fn validate(&self, args: &[String]) -> std::result::Result<(), String> {
        match self {
            Self::AcceptAny => Ok(()),
            Self::Count(expected) => {
                if args.len() == *expected {
                    Ok(())
                } else {
                    Err(Self::count_message(*expected))
                }
            }
            Self::Range { min, max } => {
                if (*min..=*max).contains(&args.len()) {
                    Ok(())
                } else {
                    Err(format!("between {min} and {max} arguments are expected"))
                }
            }
        }
    }

    fn count_message(expected: usize) -> String {
        match expected {
            0 => "no arguments are expected".to_string(),
            1 => "exactly 1 argument is expected".to_string(),
            n => format!("exactly {n} arguments are expected"),
        }
    }
}

/// A `(task, args)` pair that passed validation.
///
/// Equality is by name and the ordered args sequence: `t :a :b` and
/// `t :b :a` are different invocations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskInvocation {
    name: String,
    args: Vec<String>,
}

impl TaskInvocation {
    /// Creates an invocation with arguments.
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Creates an argument-less invocation, as dependency expansion does.
    pub fn no_args(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl std::fmt::Display for TaskInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} [{}]", self.name, self.args.join(", "))
        }
    }
}

/// Shared key-value store handle visible to handlers via
/// [`TaskContext::store`].
///
/// In serial mode every task sees the same store; in parallel mode each
/// worker gets a fresh one, so nothing written by a group member is
/// visible to its peers or to later tasks.
pub type TaskStore = Arc<Mutex<BTreeMap<String, String>>>;

/// What a handler sees while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    args: Vec<String>,
    changes: Option<ChangeSet>,
    cancel_token: CancellationToken,
    worker: String,
    store: TaskStore,
}

impl TaskContext {
    /// Creates a context; used by the executor and by tests driving
    /// handlers directly.
    #[must_use]
    pub fn new(
        args: Vec<String>,
        changes: Option<ChangeSet>,
        cancel_token: CancellationToken,
        worker: impl Into<String>,
        store: TaskStore,
    ) -> Self {
        Self {
            args,
            changes,
            cancel_token,
            worker: worker.into(),
            store,
        }
    }

    /// The arguments given to this invocation.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Incremental changes detected for this task's inputs, when its run
    /// condition tracks them.
    #[must_use]
    pub const fn changes(&self) -> Option<&ChangeSet> {
        self.changes.as_ref()
    }

    /// The logging identity of the worker running this task (`main`, or
    /// `Actor-k` in parallel mode).
    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Checks whether cancellation has been requested. Handlers should
    /// observe this at I/O boundaries.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// The cooperative cancellation token, for handlers that `select!`
    /// over it.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Reads a value from the worker's store.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.store.lock().expect("store poisoned").get(name).cloned()
    }

    /// Writes a value to the worker's store.
    pub fn put(&self, name: impl Into<String>, value: impl Into<String>) {
        self.store
            .lock()
            .expect("store poisoned")
            .insert(name.into(), value.into());
    }

    /// Snapshot of the worker's store.
    #[must_use]
    pub fn store_snapshot(&self) -> BTreeMap<String, String> {
        self.store.lock().expect("store poisoned").clone()
    }
}

/// The async handler of a task.
pub type TaskHandler = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named unit of work.
///
/// Tasks are declared by the build script and handed to the engine as a
/// plain list; dependencies are by name and resolved at graph build time.
#[derive(Clone)]
pub struct Task {
    name: String,
    handler: TaskHandler,
    depends_on: BTreeSet<String>,
    run_condition: RunCondition,
    args_validator: ArgsValidator,
    phase: Phase,
    description: String,
    is_default: bool,
}

impl Task {
    /// Creates a task with the given name and handler.
    ///
    /// The name must be non-empty; graph construction rejects empty
    /// names. Everything else defaults: no dependencies, always runs,
    /// zero arguments, build phase, not a default task.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |ctx| Box::pin(handler(ctx))),
            depends_on: BTreeSet::new(),
            run_condition: RunCondition::Always,
            args_validator: ArgsValidator::default(),
            phase: Phase::build(),
            description: String::new(),
            is_default: false,
        }
    }

    /// Declares dependencies by task name.
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets the run condition deciding whether a scheduled invocation
    /// actually executes.
    #[must_use]
    pub fn with_run_condition(mut self, condition: RunCondition) -> Self {
        self.run_condition = condition;
        self
    }

    /// Sets the args validator.
    #[must_use]
    pub const fn with_args_validator(mut self, validator: ArgsValidator) -> Self {
        self.args_validator = validator;
        self
    }

    /// Assigns the task to a phase.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Sets the human-readable description shown by `--show-tasks`.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the task as selected when the command line names no tasks.
    #[must_use]
    pub const fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    #[must_use]
    pub const fn run_condition(&self) -> &RunCondition {
        &self.run_condition
    }

    #[must_use]
    pub const fn args_validator(&self) -> &ArgsValidator {
        &self.args_validator
    }

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.is_default
    }

    /// Validates the task's own declaration, independent of the graph.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a self-dependency.
    pub fn validate(&self) -> std::result::Result<(), GraphError> {
        if self.name.is_empty() {
            return Err(GraphError::EmptyTaskName);
        }
        if self.depends_on.contains(&self.name) {
            return Err(GraphError::Cycle {
                path: vec![self.name.clone(), self.name.clone()],
            });
        }
        Ok(())
    }

    /// Invokes the handler directly, bypassing planning and caching.
    /// Useful for exercising a task in build-script tests.
    pub fn call(&self, ctx: TaskContext) -> BoxFuture<'static, Result<()>> {
        (*self.handler)(ctx)
    }

    /// A clone of the handler, for dispatch to workers.
    pub(crate) fn handler(&self) -> TaskHandler {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("run_condition", &self.run_condition)
            .field("args_validator", &self.args_validator)
            .field("phase", &self.phase)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// Terminal outcome of one task invocation.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The handler returned without error.
    Success { duration: Duration },
    /// The handler returned an error.
    Failed { failure: TaskFailure },
    /// The task never started because an earlier task failed.
    Cancelled,
}

/// Result of one task invocation, fed to `post_run` and to the caller.
#[derive(Debug, Clone)]
pub struct TaskResult {
    invocation: TaskInvocation,
    outcome: TaskOutcome,
}

impl TaskResult {
    #[must_use]
    pub const fn new(invocation: TaskInvocation, outcome: TaskOutcome) -> Self {
        Self {
            invocation,
            outcome,
        }
    }

    #[must_use]
    pub const fn invocation(&self) -> &TaskInvocation {
        &self.invocation
    }

    #[must_use]
    pub const fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.invocation.name()
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Cancelled)
    }
}
