// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! The execution planner.
//!
//! ```text
//! [TaskInvocation]
//!    expand deps        (empty args unless explicitly invoked)
//!    sort               (phase, deps-before-dependents, name)
//!    prune up-to-date   (run conditions against the cache)
//!    group              (parallel-safe sets, phase barriers)
//!        |
//!        v
//! ExecutionPlan { groups, up_to_date, header() }
//! ```
//!
//! A group never contains two tasks where one depends on the other, two
//! invocations of the same task, or tasks from two phases. In serial
//! mode every group is a singleton.

use std::collections::BTreeSet;

use crate::cache::DartleCache;
use crate::error::{DartleError, DartleResult, InvocationError, TaskFailure};
use crate::task::graph::{TaskGraph, TaskWithDeps};
use crate::task::{Phase, TaskInvocation};

/// One schedulable unit of the plan.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    invocation: TaskInvocation,
    /// Whether the task was named on the command line (or is a default
    /// task), as opposed to pulled in as a dependency.
    explicitly_selected: bool,
}

impl PlannedTask {
    #[must_use]
    pub const fn invocation(&self) -> &TaskInvocation {
        &self.invocation
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.invocation.name()
    }

    #[must_use]
    pub const fn explicitly_selected(&self) -> bool {
        self.explicitly_selected
    }
}

/// A maximal set of tasks eligible to run concurrently.
#[derive(Debug)]
pub struct TaskGroup {
    phase: Phase,
    tasks: Vec<PlannedTask>,
}

impl TaskGroup {
    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub fn tasks(&self) -> &[PlannedTask] {
        &self.tasks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// The ordered, grouped result of planning.
#[derive(Debug)]
pub struct ExecutionPlan {
    groups: Vec<TaskGroup>,
    up_to_date: Vec<TaskInvocation>,
    selected_count: usize,
    dependency_count: usize,
}

impl ExecutionPlan {
    #[must_use]
    pub fn groups(&self) -> &[TaskGroup] {
        &self.groups
    }

    /// Invocations pruned because their run condition reported nothing
    /// to do.
    #[must_use]
    pub fn up_to_date(&self) -> &[TaskInvocation] {
        &self.up_to_date
    }

    /// Number of tasks that will actually execute.
    #[must_use]
    pub fn executable_count(&self) -> usize {
        self.groups.iter().map(TaskGroup::len).sum()
    }

    /// Total scheduled tasks: executing plus up-to-date.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.executable_count() + self.up_to_date.len()
    }

    #[must_use]
    pub const fn selected_count(&self) -> usize {
        self.selected_count
    }

    #[must_use]
    pub const fn dependency_count(&self) -> usize {
        self.dependency_count
    }

    /// The canonical one-line run report.
    #[must_use]
    pub fn header(&self) -> String {
        let executing = self.executable_count();
        let total = self.total_count();
        format!(
            "Executing {executing} {} out of a total of {total} {}: {} selected, {} {}, {} up-to-date",
            plural(executing, "task", "tasks"),
            plural(total, "task", "tasks"),
            self.selected_count,
            self.dependency_count,
            plural(self.dependency_count, "dependency", "dependencies"),
            self.up_to_date.len(),
        )
    }
}

const fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// Planner inputs beyond the invocations themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerOptions {
    /// Run explicitly selected tasks even when up to date.
    pub force: bool,
    /// Allow groups with more than one task.
    pub parallel: bool,
    /// Never consult run conditions against the cache; everything runs.
    pub disable_cache: bool,
}

/// Expands, prunes and groups the selected invocations.
///
/// # Errors
///
/// Cache failures inside a run condition surface as a failure of the
/// task the condition belongs to.
pub fn plan(
    graph: &TaskGraph,
    invocations: &[TaskInvocation],
    cache: &DartleCache,
    options: PlannerOptions,
) -> DartleResult<ExecutionPlan> {
    let expanded = expand(graph, invocations)?;
    let selected_count = expanded.iter().filter(|p| p.explicitly_selected).count();
    let dependency_count = expanded.len() - selected_count;

    // Decide which scheduled tasks actually execute.
    let mut up_to_date = Vec::new();
    let mut executable: Vec<PlannedTask> = Vec::new();
    for planned in expanded {
        let run = if options.disable_cache {
            true
        } else if options.force && planned.explicitly_selected {
            true
        } else {
            let task = lookup(graph, planned.name())?;
            task.task()
                .run_condition()
                .should_run(planned.invocation(), cache)
                .map_err(|e| {
                    DartleError::from(TaskFailure {
                        name: planned.name().to_string(),
                        message: format!("{e:#}"),
                    })
                })?
        };
        if run {
            executable.push(planned);
        } else {
            tracing::debug!(task = %planned.invocation(), "Task is up-to-date");
            up_to_date.push(planned.invocation);
        }
    }

    // Stable-sort by the graph's precomputed topological ranks;
    // same-task invocations keep their command-line order.
    executable.sort_by_key(|planned| graph.rank_of(planned.name()));

    let groups = group(graph, executable, options.parallel)?;

    Ok(ExecutionPlan {
        groups,
        up_to_date,
        selected_count,
        dependency_count,
    })
}

/// Adds the transitive dependency closure of every invocation, in input
/// order. Dependencies are invoked with empty args unless the selection
/// already contains an invocation for that task.
fn expand(graph: &TaskGraph, invocations: &[TaskInvocation]) -> DartleResult<Vec<PlannedTask>> {
    let explicit: BTreeSet<&str> = invocations.iter().map(TaskInvocation::name).collect();
    let mut planned: Vec<PlannedTask> = invocations
        .iter()
        .map(|invocation| PlannedTask {
            invocation: invocation.clone(),
            explicitly_selected: true,
        })
        .collect();

    let mut added: BTreeSet<String> = BTreeSet::new();
    for invocation in invocations {
        let task = lookup(graph, invocation.name())?;
        for dep in task.transitive_dependencies() {
            if explicit.contains(dep.as_str()) || !added.insert(dep.clone()) {
                continue;
            }
            planned.push(PlannedTask {
                invocation: TaskInvocation::no_args(dep.clone()),
                explicitly_selected: false,
            });
        }
    }
    Ok(planned)
}

/// Greedy packing into parallel-safe groups.
fn group(
    graph: &TaskGraph,
    executable: Vec<PlannedTask>,
    parallel: bool,
) -> DartleResult<Vec<TaskGroup>> {
    let mut groups: Vec<TaskGroup> = Vec::new();
    let mut current: Vec<PlannedTask> = Vec::new();
    let mut current_names: BTreeSet<String> = BTreeSet::new();
    let mut current_phase: Option<Phase> = None;

    for planned in executable {
        let task = lookup(graph, planned.name())?;
        let phase = task.phase().clone();

        let needs_boundary = match &current_phase {
            None => false,
            Some(open_phase) => {
                *open_phase != phase
                    || !parallel
                    || current_names.contains(planned.name())
                    || current_names
                        .iter()
                        .any(|name| task.depends_transitively_on(name))
            }
        };

        if needs_boundary && !current.is_empty() {
            groups.push(TaskGroup {
                phase: current_phase.take().expect("group has a phase"),
                tasks: std::mem::take(&mut current),
            });
            current_names.clear();
        }

        current_names.insert(planned.name().to_string());
        current.push(planned);
        current_phase = Some(phase);
    }

    if !current.is_empty() {
        groups.push(TaskGroup {
            phase: current_phase.expect("group has a phase"),
            tasks: current,
        });
    }
    Ok(groups)
}

fn lookup<'a>(graph: &'a TaskGraph, name: &str) -> DartleResult<&'a TaskWithDeps> {
    graph.get(name).ok_or_else(|| {
        InvocationError::TaskDoesNotExist {
            name: name.to_string(),
            suggestion: None,
        }
        .into()
    })
}
