// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Task graph construction and verification.
//!
//! ```text
//! [Task] --> TaskGraph::new
//!    name/phase validation
//!    dependency resolution (with path reporting)
//!    cycle detection        [e -> f -> g -> h -> e]
//!    transitive closures    TaskWithDeps
//!    schedule ranks         topological, (phase, name) tie-break
//!        |
//!        v
//!    verify()
//!      phase consistency:   deps only in same or earlier phase
//!      task-I/O clashes:    outputs(A) ∩ inputs(B) needs B -> A
//!      delete tasks:        must run strictly before what they touch
//! ```
//!
//! Tasks are stored in a name-keyed map and dependencies stay names;
//! the petgraph mirror is built once for the structural checks so task
//! values never form reference cycles. The scheduling order is a true
//! topological order computed once at build time: pairwise comparisons
//! of the "dependencies first, then alphabetical" rule are not
//! transitive, so the order has to come from the graph, not a sort
//! comparator.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::collection::FileCollection;
use crate::error::{DartleResult, GraphError, PhaseViolation, io_error};
use crate::task::{Phase, PhaseRegistry, Task};

/// A task plus its transitive dependency closure, resolved once at graph
/// build time.
#[derive(Debug, Clone)]
pub struct TaskWithDeps {
    task: Task,
    transitive_deps: BTreeSet<String>,
}

impl TaskWithDeps {
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.task.name()
    }

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        self.task.phase()
    }

    /// Direct dependencies as declared.
    #[must_use]
    pub const fn direct_dependencies(&self) -> &BTreeSet<String> {
        self.task.depends_on()
    }

    /// The full transitive dependency closure.
    #[must_use]
    pub const fn transitive_dependencies(&self) -> &BTreeSet<String> {
        &self.transitive_deps
    }

    /// Whether `other` is anywhere below this task.
    #[must_use]
    pub fn depends_transitively_on(&self, other: &str) -> bool {
        self.transitive_deps.contains(other)
    }
}

/// Map from task name to the delete-tasks that target its inputs or
/// outputs, produced by verification for replanning warnings.
pub type DeleteTaskMap = BTreeMap<String, Vec<String>>;

/// A validated, acyclic set of tasks keyed by name.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: BTreeMap<String, TaskWithDeps>,
    phases: PhaseRegistry,
    /// Scheduling rank per task: a topological order of the whole graph,
    /// phases ascending, alphabetical among simultaneously ready tasks.
    schedule: BTreeMap<String, usize>,
}

impl TaskGraph {
    /// Builds the graph, resolving dependencies, closures and the
    /// scheduling order.
    ///
    /// # Errors
    ///
    /// Fails on empty or duplicate names, unregistered phases, unknown
    /// dependency names (reporting the dependency path), and cycles
    /// (reporting the full walk).
    pub fn new(tasks: Vec<Task>, phases: PhaseRegistry) -> DartleResult<Self> {
        let mut by_name: BTreeMap<String, Task> = BTreeMap::new();
        for task in tasks {
            task.validate()?;
            if !phases.contains(task.phase()) {
                return Err(GraphError::UnknownPhase {
                    task: task.name().to_string(),
                    phase: task.phase().name().to_string(),
                }
                .into());
            }
            if by_name.contains_key(task.name()) {
                return Err(GraphError::DuplicateTask {
                    name: task.name().to_string(),
                }
                .into());
            }
            by_name.insert(task.name().to_string(), task);
        }

        Self::check_dependencies_resolve(&by_name)?;
        Self::check_acyclic(&by_name)?;
        let schedule = Self::compute_schedule(&by_name);

        let tasks = by_name
            .values()
            .map(|task| {
                let transitive_deps = Self::closure_of(&by_name, task);
                (
                    task.name().to_string(),
                    TaskWithDeps {
                        task: task.clone(),
                        transitive_deps,
                    },
                )
            })
            .collect();

        Ok(Self {
            tasks,
            phases,
            schedule,
        })
    }

    /// Walks every dependency reference and reports the first unknown
    /// name together with the path that reached it.
    fn check_dependencies_resolve(tasks: &BTreeMap<String, Task>) -> DartleResult<()> {
        for root in tasks.values() {
            let mut stack = vec![(root.name().to_string(), Vec::<String>::new())];
            let mut visited = BTreeSet::new();
            while let Some((name, path)) = stack.pop() {
                if !visited.insert(name.clone()) {
                    continue;
                }
                let Some(task) = tasks.get(&name) else {
                    return Err(GraphError::MissingDependency { name, path }.into());
                };
                let mut next_path = path;
                next_path.push(name);
                for dep in task.depends_on() {
                    stack.push((dep.clone(), next_path.clone()));
                }
            }
        }
        Ok(())
    }

    /// Cycle detection by DFS coloring over a petgraph mirror, reporting
    /// the complete walk of the first cycle found.
    fn check_acyclic(tasks: &BTreeMap<String, Task>) -> DartleResult<()> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
        for name in tasks.keys() {
            index_of.insert(name, graph.add_node(name));
        }
        for task in tasks.values() {
            let from = index_of[task.name()];
            for dep in task.depends_on() {
                graph.add_edge(from, index_of[dep.as_str()], ());
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unseen,
            Active,
            Done,
        }

        let mut marks = vec![Mark::Unseen; graph.node_count()];
        for start in graph.node_indices() {
            if marks[start.index()] != Mark::Unseen {
                continue;
            }
            // Iterative DFS keeping the active path for cycle reporting.
            let mut path: Vec<NodeIndex> = Vec::new();
            let mut stack = vec![(start, false)];
            while let Some((node, leaving)) = stack.pop() {
                if leaving {
                    marks[node.index()] = Mark::Done;
                    path.pop();
                    continue;
                }
                if marks[node.index()] == Mark::Done {
                    continue;
                }
                if marks[node.index()] == Mark::Active {
                    continue;
                }
                marks[node.index()] = Mark::Active;
                path.push(node);
                stack.push((node, true));
                for next in graph.neighbors(node) {
                    match marks[next.index()] {
                        Mark::Active => {
                            let cycle_start = path
                                .iter()
                                .position(|&n| n == next)
                                .unwrap_or(0);
                            let mut cycle: Vec<String> = path[cycle_start..]
                                .iter()
                                .map(|&n| graph[n].to_string())
                                .collect();
                            cycle.push(graph[next].to_string());
                            return Err(GraphError::Cycle { path: cycle }.into());
                        }
                        Mark::Unseen => stack.push((next, false)),
                        Mark::Done => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Computes the scheduling rank of every task: Kahn's algorithm,
    /// always emitting the ready task with the lowest `(phase priority,
    /// name)` key. Dependencies therefore always precede dependents, and
    /// the phase/alphabetical preferences apply exactly where the graph
    /// leaves a choice. The graph is already known to be acyclic, so
    /// every task receives a rank.
    fn compute_schedule(tasks: &BTreeMap<String, Task>) -> BTreeMap<String, usize> {
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for task in tasks.values() {
            indegree.insert(task.name(), task.depends_on().len());
            for dep in task.depends_on() {
                dependents.entry(dep.as_str()).or_default().push(task.name());
            }
        }

        let mut ready: BinaryHeap<Reverse<(i32, &str)>> = indegree
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&name, _)| Reverse((tasks[name].phase().priority(), name)))
            .collect();

        let mut schedule = BTreeMap::new();
        while let Some(Reverse((_, name))) = ready.pop() {
            schedule.insert(name.to_string(), schedule.len());
            for &dependent in dependents.get(name).into_iter().flatten() {
                let count = indegree
                    .get_mut(dependent)
                    .expect("dependent is a declared task");
                *count -= 1;
                if *count == 0 {
                    ready.push(Reverse((tasks[dependent].phase().priority(), dependent)));
                }
            }
        }
        schedule
    }

    /// The phases this graph was built against.
    #[must_use]
    pub const fn phases(&self) -> &PhaseRegistry {
        &self.phases
    }

    /// Looks a task up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TaskWithDeps> {
        self.tasks.get(name)
    }

    /// The position of a task in the scheduling order. Unknown names
    /// sort last.
    #[must_use]
    pub fn rank_of(&self, name: &str) -> usize {
        self.schedule.get(name).copied().unwrap_or(usize::MAX)
    }

    /// All tasks in scheduling order: a topological order with phases
    /// ascending and alphabetical tie-breaking.
    #[must_use]
    pub fn sorted_tasks(&self) -> Vec<&TaskWithDeps> {
        let mut tasks: Vec<&TaskWithDeps> = self.tasks.values().collect();
        tasks.sort_by_key(|t| self.rank_of(t.name()));
        tasks
    }

    /// Tasks marked as default, in scheduling order.
    #[must_use]
    pub fn default_tasks(&self) -> Vec<&TaskWithDeps> {
        self.sorted_tasks()
            .into_iter()
            .filter(|t| t.task().is_default())
            .collect()
    }

    /// All task names.
    #[must_use]
    pub fn task_names(&self) -> BTreeSet<String> {
        self.tasks.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs phase and task-I/O consistency verification.
    ///
    /// Returns the map from task name to the delete-tasks that target
    /// its files, used to warn on replanning.
    ///
    /// # Errors
    ///
    /// Fails when a task depends on a later-phase task, when two
    /// incremental tasks share files without a dependency between them,
    /// or when a delete-task does not run strictly before the tasks
    /// whose files it deletes.
    pub fn verify(&self) -> DartleResult<DeleteTaskMap> {
        self.verify_phases()?;
        self.verify_task_io()
    }

    /// Every dependency must live in the same or an earlier phase.
    /// Violations are collected and reported together.
    fn verify_phases(&self) -> DartleResult<()> {
        let mut violations = Vec::new();
        for task in self.tasks.values() {
            for dep_name in task.direct_dependencies() {
                let Some(dep) = self.tasks.get(dep_name) else {
                    continue;
                };
                if dep.phase().is_after(task.phase()) {
                    violations.push(PhaseViolation {
                        task: task.name().to_string(),
                        task_phase: task.phase().name().to_string(),
                        dependency: dep.name().to_string(),
                        dependency_phase: dep.phase().name().to_string(),
                    });
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(GraphError::PhaseViolations(violations).into())
        }
    }

    /// Task-I/O consistency: shared files require declared dependencies,
    /// and deletion targets must be gone before their consumers run.
    ///
    /// Inputs and outputs are gathered from every `OnChanges` leaf of a
    /// task's condition, so collections wrapped in `And`/`Or` combinators
    /// are verified exactly like bare ones.
    fn verify_task_io(&self) -> DartleResult<DeleteTaskMap> {
        let tasks = self.sorted_tasks();

        for producer in &tasks {
            let producer_leaves = producer.task().run_condition().on_changes_leaves();
            if producer_leaves.is_empty() {
                continue;
            }
            for consumer in &tasks {
                if consumer.name() == producer.name() {
                    continue;
                }
                let consumer_leaves = consumer.task().run_condition().on_changes_leaves();
                if consumer_leaves.is_empty() {
                    continue;
                }
                let mut clashing = BTreeSet::new();
                for (_, outputs) in &producer_leaves {
                    for (inputs, _) in &consumer_leaves {
                        clashing.extend(outputs.intersection(inputs).map_err(io_error)?);
                    }
                }
                if clashing.is_empty() {
                    continue;
                }
                if !consumer.depends_transitively_on(producer.name()) {
                    return Err(GraphError::MustDependOn {
                        task: consumer.name().to_string(),
                        dependency: producer.name().to_string(),
                        clashing: clashing
                            .into_iter()
                            .map(|p| p.display().to_string())
                            .collect(),
                    }
                    .into());
                }
            }
        }

        let mut delete_map = DeleteTaskMap::new();
        for deleter in &tasks {
            let Some(targets) = deleter.task().run_condition().deletion_targets() else {
                continue;
            };
            for other in &tasks {
                if other.name() == deleter.name() {
                    continue;
                }
                if !Self::files_overlap(targets, other).map_err(io_error)? {
                    continue;
                }
                if !deleter.phase().is_before(other.phase()) {
                    return Err(GraphError::DeleteTaskPhase {
                        delete_task: deleter.name().to_string(),
                        delete_phase: deleter.phase().name().to_string(),
                        task: other.name().to_string(),
                        task_phase: other.phase().name().to_string(),
                    }
                    .into());
                }
                delete_map
                    .entry(other.name().to_string())
                    .or_default()
                    .push(deleter.name().to_string());
            }
        }
        Ok(delete_map)
    }

    /// Whether deletion targets overlap a task's declared inputs or
    /// outputs, across every `OnChanges` leaf.
    fn files_overlap(targets: &FileCollection, task: &TaskWithDeps) -> crate::error::Result<bool> {
        for (inputs, outputs) in task.task().run_condition().on_changes_leaves() {
            for collection in [inputs, outputs] {
                if !targets.intersection(collection)?.is_empty() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
