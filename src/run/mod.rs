// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! The run entry point: what a build script's `main` calls.
//!
//! ```text
//! run(args, tasks)
//!   parse options (clap) ----> help/version: print, exit 0
//!   load config (dartle.toml, DARTLE_*, flags win)
//!   init logging
//!   TaskGraph::new + verify
//!   -s / -g ----> print listing or tree, exit 0
//!   parse invocations
//!   plan ----> header line
//!   execute ----> exit code from the error taxonomy
//!   cache GC (remove_not_matching)
//! ```

use std::collections::BTreeSet;
use std::process::ExitCode;

use crate::cache::DartleCache;
use crate::cli::{Options, ParseOutcome, parse_args};
use crate::config::Config;
use crate::config::loader::ConfigLoader;
use crate::error::DartleResult;
use crate::logging::{LogConfig, init_logging};
use crate::task::executor::{Executor, ExecutorOptions};
use crate::task::graph::{TaskGraph, TaskWithDeps};
use crate::task::invocation::parse_invocations;
use crate::task::planner::{ExecutionPlan, PlannerOptions, plan};
use crate::task::{PhaseRegistry, Task, TaskInvocation};

/// Everything one run needs, after merging configuration and flags.
#[derive(Debug, Clone)]
struct RunSettings {
    parallel: bool,
    force: bool,
    disable_cache: bool,
    cache_dir: std::path::PathBuf,
    max_workers: usize,
}

impl RunSettings {
    /// CLI flags win over `dartle.toml` and `DARTLE_*` values.
    fn merge(options: &Options, config: &Config) -> Self {
        let parallel = if options.parallel_tasks {
            true
        } else if options.no_parallel_tasks {
            false
        } else {
            config.parallel_tasks
        };
        Self {
            parallel,
            force: options.force,
            disable_cache: options.disable_cache || config.disable_cache,
            cache_dir: config.cache_dir.clone(),
            max_workers: config.worker_count(),
        }
    }
}

/// Runs a build: the entry point for build scripts.
///
/// Parses `args` (everything after the program name), merges them with
/// `dartle.toml` and `DARTLE_*` environment overrides, and drives the
/// engine over the declared tasks. The returned exit code follows the
/// engine taxonomy: 0 success, 1 invocation or task error, 2 multiple
/// errors or cancelled tasks, 4 unknown option.
///
/// # Example
///
/// ```no_run
/// use dartle::{run, Task};
///
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     let hello = Task::new("hello", |_ctx| async {
///         println!("hello!");
///         Ok(())
///     })
///     .with_default(true);
///
///     run(std::env::args().skip(1), vec![hello]).await
/// }
/// ```
pub async fn run<I, T>(args: I, tasks: Vec<Task>) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    run_with_phases(args, tasks, PhaseRegistry::new()).await
}

/// Like [`run`], with custom phases registered for this run only.
pub async fn run_with_phases<I, T>(args: I, tasks: Vec<Task>, phases: PhaseRegistry) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let full_args = std::iter::once(std::ffi::OsString::from("dartle"))
        .chain(args.into_iter().map(Into::into));
    let options = match parse_args(full_args) {
        Ok(ParseOutcome::Run(options)) => options,
        Ok(ParseOutcome::Print(text)) => {
            println!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(error.exit_code());
        }
    };

    let config = match load_config() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Failed to load configuration: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_config = LogConfig::builder()
        .with_console_level(options.log_level.unwrap_or(config.log_level))
        .with_ansi(config.color && !options.no_color)
        .maybe_with_log_file(config.log_file.as_ref().map(|p| p.display().to_string()))
        .build();
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("Failed to initialize logging: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    match try_run(&options, &config, tasks, phases).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn load_config() -> crate::error::Result<Config> {
    ConfigLoader::new()
        .add_toml_file_optional("dartle.toml")
        .with_env_prefix("DARTLE")
        .build()
}

/// The testable core of [`run`]: everything after option parsing,
/// configuration and logging setup.
///
/// # Errors
///
/// Returns the engine error for the failure mode of the run; the caller
/// maps it to an exit code via [`crate::error::DartleError::exit_code`].
pub async fn try_run(
    options: &Options,
    config: &Config,
    tasks: Vec<Task>,
    phases: PhaseRegistry,
) -> DartleResult<()> {
    let settings = RunSettings::merge(options, config);
    let graph = TaskGraph::new(tasks, phases)?;
    let delete_map = graph.verify()?;

    if options.show_tasks {
        print_task_list(&graph, &options.tokens);
        return Ok(());
    }

    let invocations = parse_invocations(&options.tokens, &graph)?;

    if options.show_task_graph {
        print_task_tree(&graph, &invocations);
        return Ok(());
    }

    let cache = if settings.disable_cache {
        DartleCache::detached(&settings.cache_dir)
    } else {
        DartleCache::init(&settings.cache_dir)?
    };

    let execution_plan = plan(
        &graph,
        &invocations,
        &cache,
        PlannerOptions {
            force: settings.force,
            parallel: settings.parallel,
            disable_cache: settings.disable_cache,
        },
    )?;

    for group in execution_plan.groups() {
        for planned in group.tasks() {
            if let Some(deleters) = delete_map.get(planned.name()) {
                tracing::warn!(
                    task = %planned.name(),
                    deleted_by = ?deleters,
                    "Task files are targeted by deletion tasks"
                );
            }
        }
    }

    tracing::info!("{}", execution_plan.header());

    let executor = Executor::new(
        &graph,
        &cache,
        ExecutorOptions {
            parallel: settings.parallel,
            disable_cache: settings.disable_cache,
            max_workers: settings.max_workers,
        },
    );
    let result = executor.execute(&execution_plan).await;

    if !settings.disable_cache {
        collect_garbage(&graph, &cache);
    }

    match result.to_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Drops cache records that no longer correspond to any declared task or
/// any live cache key. Failures only warn: garbage is not worth failing
/// a successful build over.
fn collect_garbage(graph: &TaskGraph, cache: &DartleCache) {
    let task_names = graph.task_names();
    let mut keys = BTreeSet::new();
    for task in graph.sorted_tasks() {
        task.task().run_condition().collect_cache_keys(&mut keys);
    }
    if let Err(error) = cache.remove_not_matching(&task_names, &keys) {
        tracing::warn!(error = %format!("{error:#}"), "Cache garbage collection failed");
    }
}

/// `--show-tasks`: the task list grouped by phase, with `[default]` and
/// `[always-runs]` tags, then the planned execution order.
fn print_task_list(graph: &TaskGraph, tokens: &[String]) {
    println!("Tasks declared in this build:");
    for phase in graph.phases().all() {
        let members: Vec<&TaskWithDeps> = graph
            .sorted_tasks()
            .into_iter()
            .filter(|t| t.phase() == phase)
            .collect();
        if members.is_empty() {
            continue;
        }
        println!("\n==> {phase} phase:");
        for member in members {
            let task = member.task();
            let mut line = format!("  * {}", task.name());
            if task.is_default() {
                line.push_str(" [default]");
            }
            if task.run_condition().always_runs() {
                line.push_str(" [always-runs]");
            }
            println!("{line}");
            if !task.description().is_empty() {
                println!("      {}", task.description());
            }
        }
    }

    // The order is computed without cache pruning so it shows every task
    // the selection would schedule.
    if let Ok(invocations) = parse_invocations(tokens, graph) {
        let detached = DartleCache::detached(".");
        if let Ok(execution_plan) = plan(
            graph,
            &invocations,
            &detached,
            PlannerOptions {
                parallel: true,
                disable_cache: true,
                ..PlannerOptions::default()
            },
        ) {
            println!("\nPlanned execution order:");
            print_plan_order(&execution_plan);
        }
    }
}

fn print_plan_order(execution_plan: &ExecutionPlan) {
    let mut index = 0;
    for group in execution_plan.groups() {
        for planned in group.tasks() {
            index += 1;
            println!("  {index}. {}", planned.invocation());
        }
    }
}

/// `--show-task-graph`: the dependency tree of the selected tasks,
/// indenting one level per dependency hop and eliding repeated subtrees.
fn print_task_tree(graph: &TaskGraph, invocations: &[TaskInvocation]) {
    println!("Task graph:");
    let mut printed = BTreeSet::new();
    for invocation in invocations {
        if let Some(task) = graph.get(invocation.name()) {
            print_subtree(graph, task, 1, &mut printed);
        }
    }
    println!("\n(*) subtree shown above");
}

fn print_subtree(
    graph: &TaskGraph,
    task: &TaskWithDeps,
    depth: usize,
    printed: &mut BTreeSet<String>,
) {
    let indent = "  ".repeat(depth);
    let has_deps = !task.direct_dependencies().is_empty();
    if !printed.insert(task.name().to_string()) && has_deps {
        println!("{indent}{} (*)", task.name());
        return;
    }
    println!("{indent}{}", task.name());
    for dep in task.direct_dependencies() {
        if let Some(dep_task) = graph.get(dep) {
            print_subtree(graph, dep_task, depth + 1, printed);
        }
    }
}
