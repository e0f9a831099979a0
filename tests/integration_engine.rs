// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end engine scenarios driven through the public entry point.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use dartle::cli::Options;
use dartle::config::Config;
use dartle::{FileCollection, PhaseRegistry, RunCondition, Task, try_run};

struct Sandbox {
    _tmp: TempDir,
    config: Config,
    work: PathBuf,
}

fn sandbox() -> Sandbox {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        cache_dir: tmp.path().join("cache"),
        ..Config::default()
    };
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();
    Sandbox {
        _tmp: tmp,
        config,
        work,
    }
}

fn options(tokens: &[&str]) -> Options {
    Options {
        tokens: tokens.iter().map(ToString::to_string).collect(),
        ..Options::default()
    }
}

/// A task that appends its name to a shared journal when it runs.
fn journaled(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Task {
    let journal = Arc::clone(journal);
    let task_name = name.to_string();
    Task::new(name, move |_ctx| {
        let journal = Arc::clone(&journal);
        let task_name = task_name.clone();
        async move {
            journal.lock().unwrap().push(task_name);
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_serial_execution_order_respects_dependencies() {
    let sb = sandbox();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let tasks = vec![
        journaled("a", &journal).with_depends_on(["b", "c"]),
        journaled("b", &journal),
        journaled("c", &journal),
        journaled("d", &journal).with_depends_on(["a"]),
    ];

    try_run(
        &options(&["a", "b", "c", "d"]),
        &sb.config,
        tasks,
        PhaseRegistry::new(),
    )
    .await
    .unwrap();

    let order = journal.lock().unwrap().clone();
    assert_eq!(order, vec!["b", "c", "a", "d"]);
}

#[tokio::test]
async fn test_incremental_encode_scenario() {
    let sb = sandbox();
    let source = sb.work.join("source.txt");
    let output = sb.work.join("out.txt");
    fs::write(&source, "print('v1');").unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let make_tasks = |runs: &Arc<AtomicUsize>| {
        let runs = Arc::clone(runs);
        let source = source.clone();
        let output = output.clone();
        let out_for_handler = output.clone();
        let src_for_handler = source.clone();
        vec![
            Task::new("encode", move |_ctx| {
                let runs = Arc::clone(&runs);
                let src = src_for_handler.clone();
                let out = out_for_handler.clone();
                async move {
                    let text = fs::read_to_string(&src)?;
                    fs::write(&out, text.to_uppercase())?;
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_run_condition(RunCondition::on_changes(
                FileCollection::file(&source),
                FileCollection::file(&output),
            )),
        ]
    };

    // First run executes the task.
    try_run(
        &options(&["encode"]),
        &sb.config,
        make_tasks(&runs),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(output.is_file());

    // Second run with no changes: up to date, nothing executes.
    try_run(
        &options(&["encode"]),
        &sb.config,
        make_tasks(&runs),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Forced run executes regardless.
    let forced = Options {
        force: true,
        ..options(&["encode"])
    };
    try_run(&forced, &sb.config, make_tasks(&runs), PhaseRegistry::new())
        .await
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Editing the source wakes the task up again.
    fs::write(&source, "print('v2');").unwrap();
    try_run(
        &options(&["encode"]),
        &sb.config,
        make_tasks(&runs),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(fs::read_to_string(&output).unwrap(), "PRINT('V2');");
}

#[tokio::test]
async fn test_clean_task_deletes_and_settles() {
    let sb = sandbox();
    let junk = sb.work.join("junk.txt");
    fs::write(&junk, "scraps").unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let make_tasks = |runs: &Arc<AtomicUsize>| {
        let runs = Arc::clone(runs);
        let junk = junk.clone();
        vec![
            Task::new("clean", move |_ctx| {
                let runs = Arc::clone(&runs);
                let junk = junk.clone();
                async move {
                    if junk.is_file() {
                        fs::remove_file(&junk)?;
                    }
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_run_condition(RunCondition::ToDelete(FileCollection::file(&junk))),
        ]
    };

    // Target exists: the clean task runs and deletes it.
    try_run(
        &options(&["clean"]),
        &sb.config,
        make_tasks(&runs),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!junk.exists());

    // Target gone: nothing to do.
    try_run(
        &options(&["clean"]),
        &sb.config,
        make_tasks(&runs),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_produces_joint_error_with_cancellations() {
    let sb = sandbox();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let tasks = vec![
        Task::new("explode", |_ctx| async { anyhow::bail!("kaboom") }),
        journaled("dependent", &journal).with_depends_on(["explode"]),
    ];

    let error = try_run(
        &options(&["dependent"]),
        &sb.config,
        tasks,
        PhaseRegistry::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(error.exit_code(), 2);
    let message = error.to_string();
    assert!(message.contains("Several errors have occurred"));
    assert!(message.contains("kaboom"));
    assert!(message.contains("Task 'dependent' was cancelled"));
    assert!(journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_tear_down_runs_after_build_failure() {
    let sb = sandbox();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let tasks = vec![
        Task::new("explode", |_ctx| async { anyhow::bail!("kaboom") }),
        journaled("sweep", &journal).with_phase(dartle::Phase::tear_down()),
    ];

    let error = try_run(
        &options(&["explode", "sweep"]),
        &sb.config,
        tasks,
        PhaseRegistry::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(error.exit_code(), 1);
    assert_eq!(journal.lock().unwrap().clone(), vec!["sweep"]);
}

#[tokio::test]
async fn test_parallel_state_isolation_end_to_end() {
    let sb = sandbox();
    let observed: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));

    let make_tasks = |observed: &Arc<Mutex<Option<usize>>>| {
        let observed = Arc::clone(observed);
        let writer = |name: &str| {
            let key = name.to_string();
            Task::new(name, move |ctx| {
                let key = key.clone();
                async move {
                    ctx.put(key, "1");
                    Ok(())
                }
            })
        };
        vec![
            writer("left"),
            writer("right"),
            Task::new("read", move |ctx| {
                let observed = Arc::clone(&observed);
                async move {
                    *observed.lock().unwrap() = Some(ctx.store_snapshot().len());
                    Ok(())
                }
            })
            .with_depends_on(["left", "right"]),
        ]
    };

    // Parallel: workers share nothing, the reader sees an empty store.
    let parallel = Options {
        parallel_tasks: true,
        ..options(&["read"])
    };
    try_run(
        &parallel,
        &sb.config,
        make_tasks(&observed),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(0));

    // Serial: one store on the main worker, the reader sees both writes.
    let serial = Options {
        no_parallel_tasks: true,
        ..options(&["read"])
    };
    try_run(
        &serial,
        &sb.config,
        make_tasks(&observed),
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(2));
}

#[tokio::test]
async fn test_task_args_reach_the_handler() {
    let sb = sandbox();
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let tasks = vec![
        Task::new("greet", move |ctx| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().extend(ctx.args().iter().cloned());
                Ok(())
            }
        })
        .with_args_validator(dartle::ArgsValidator::Range { min: 1, max: 2 }),
    ];

    try_run(
        &options(&["greet", ":hello", ":world"]),
        &sb.config,
        tasks,
        PhaseRegistry::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        received.lock().unwrap().clone(),
        vec!["hello".to_string(), "world".to_string()]
    );
}
