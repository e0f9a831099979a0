// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use super::RunCondition;
use crate::cache::DartleCache;
use crate::collection::FileCollection;
use crate::task::{TaskInvocation, TaskOutcome, TaskResult};

struct Fixture {
    _tmp: TempDir,
    cache: DartleCache,
    work: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let cache = DartleCache::init(tmp.path().join("cache")).unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();
    Fixture {
        _tmp: tmp,
        cache,
        work,
    }
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn success(name: &str) -> TaskResult {
    TaskResult::new(
        TaskInvocation::no_args(name),
        TaskOutcome::Success {
            duration: Duration::from_millis(1),
        },
    )
}

fn failure(name: &str) -> TaskResult {
    TaskResult::new(
        TaskInvocation::no_args(name),
        TaskOutcome::Failed {
            failure: crate::error::TaskFailure {
                name: name.to_string(),
                message: "boom".to_string(),
            },
        },
    )
}

#[test]
fn test_always_runs() {
    let f = fixture();
    let invocation = TaskInvocation::no_args("t");
    assert!(RunCondition::Always
        .should_run(&invocation, &f.cache)
        .unwrap());
    assert!(RunCondition::Always.always_runs());
}

#[test]
fn test_on_changes_empty_collections_never_run() {
    let f = fixture();
    let condition = RunCondition::on_changes(FileCollection::empty(), FileCollection::empty());
    let invocation = TaskInvocation::no_args("t");
    assert!(!condition.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_on_changes_full_cycle() {
    let f = fixture();
    let input = f.work.join("in.txt");
    let output = f.work.join("out.txt");
    write(&input, "v1");

    let condition = RunCondition::on_changes(
        FileCollection::file(&input),
        FileCollection::file(&output),
    );
    let invocation = TaskInvocation::no_args("encode");

    // Never ran: input is unseen and the output is missing.
    assert!(condition.should_run(&invocation, &f.cache).unwrap());

    // Simulate a successful run.
    write(&output, "encoded v1");
    condition.post_run(&success("encode"), &f.cache).unwrap();

    // Nothing changed and the output exists: up to date.
    assert!(!condition.should_run(&invocation, &f.cache).unwrap());

    // Input edit wakes the task up.
    write(&input, "v2");
    assert!(condition.should_run(&invocation, &f.cache).unwrap());
    condition.post_run(&success("encode"), &f.cache).unwrap();
    assert!(!condition.should_run(&invocation, &f.cache).unwrap());

    // Output tampering wakes it up too.
    write(&output, "corrupted");
    assert!(condition.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_on_changes_missing_output_forces_run() {
    let f = fixture();
    let input = f.work.join("in.txt");
    let output = f.work.join("out.txt");
    write(&input, "v1");
    write(&output, "built");

    let condition = RunCondition::on_changes(
        FileCollection::file(&input),
        FileCollection::file(&output),
    );
    let invocation = TaskInvocation::no_args("encode");
    condition.post_run(&success("encode"), &f.cache).unwrap();
    assert!(!condition.should_run(&invocation, &f.cache).unwrap());

    fs::remove_file(&output).unwrap();
    assert!(condition.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_on_changes_failure_does_not_update_cache() {
    let f = fixture();
    let input = f.work.join("in.txt");
    write(&input, "v1");

    let condition =
        RunCondition::on_changes(FileCollection::file(&input), FileCollection::empty());
    let invocation = TaskInvocation::no_args("t");

    assert!(condition.should_run(&invocation, &f.cache).unwrap());
    condition.post_run(&failure("t"), &f.cache).unwrap();
    // Still dirty: the failed run must not mark anything up to date.
    assert!(condition.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_on_changes_keyed_scopes_do_not_interfere() {
    let f = fixture();
    let input = f.work.join("in.txt");
    write(&input, "v1");
    let inputs = FileCollection::file(&input);

    let first = RunCondition::on_changes_keyed(inputs.clone(), FileCollection::empty(), "first");
    let second = RunCondition::on_changes_keyed(inputs, FileCollection::empty(), "second");
    let invocation = TaskInvocation::no_args("t");

    first.post_run(&success("t"), &f.cache).unwrap();
    assert!(!first.should_run(&invocation, &f.cache).unwrap());
    assert!(second.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_at_most_every_first_run_and_fingerprint() {
    let f = fixture();
    let condition = RunCondition::AtMostEvery(Duration::from_secs(3600));
    let plain = TaskInvocation::no_args("report");

    // No record yet.
    assert!(condition.should_run(&plain, &f.cache).unwrap());

    condition.post_run(&success("report"), &f.cache).unwrap();
    // Within the period with identical args: skip.
    assert!(!condition.should_run(&plain, &f.cache).unwrap());

    // Different args: the fingerprint changed, run regardless of time.
    let with_args = TaskInvocation::new("report", vec!["--full".to_string()]);
    assert!(condition.should_run(&with_args, &f.cache).unwrap());
}

#[test]
fn test_at_most_every_period_expiry() {
    let f = fixture();
    let condition = RunCondition::AtMostEvery(Duration::ZERO);
    let invocation = TaskInvocation::no_args("tick");
    condition.post_run(&success("tick"), &f.cache).unwrap();
    // A zero period is always expired.
    assert!(condition.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_to_delete_runs_while_targets_exist() {
    let f = fixture();
    let target = f.work.join("junk.txt");
    let condition = RunCondition::ToDelete(FileCollection::file(&target));
    let invocation = TaskInvocation::no_args("clean");

    assert!(!condition.should_run(&invocation, &f.cache).unwrap());
    write(&target, "junk");
    assert!(condition.should_run(&invocation, &f.cache).unwrap());

    // post_run records nothing; only the deletion itself silences it.
    condition.post_run(&success("clean"), &f.cache).unwrap();
    assert!(condition.should_run(&invocation, &f.cache).unwrap());
    fs::remove_file(&target).unwrap();
    assert!(!condition.should_run(&invocation, &f.cache).unwrap());
}

#[test]
fn test_and_or_combinators() {
    let f = fixture();
    let target = f.work.join("present.txt");
    write(&target, "x");
    let yes = RunCondition::ToDelete(FileCollection::file(&target));
    let no = RunCondition::ToDelete(FileCollection::file(f.work.join("absent.txt")));
    let invocation = TaskInvocation::no_args("t");

    assert!(RunCondition::And(vec![yes.clone(), yes.clone()])
        .should_run(&invocation, &f.cache)
        .unwrap());
    assert!(!RunCondition::And(vec![yes.clone(), no.clone()])
        .should_run(&invocation, &f.cache)
        .unwrap());
    assert!(RunCondition::Or(vec![no.clone(), yes.clone()])
        .should_run(&invocation, &f.cache)
        .unwrap());
    assert!(!RunCondition::Or(vec![no.clone(), no])
        .should_run(&invocation, &f.cache)
        .unwrap());
}

#[test]
fn test_combinator_post_run_fans_out() {
    let f = fixture();
    let input = f.work.join("in.txt");
    write(&input, "v1");
    let inner = RunCondition::on_changes(FileCollection::file(&input), FileCollection::empty());
    let combined = RunCondition::Or(vec![RunCondition::AtMostEvery(Duration::from_secs(60)), inner]);

    combined.post_run(&success("t"), &f.cache).unwrap();

    // Both children recorded their state.
    assert!(!f
        .cache
        .has_task_invocation_changed("t", &[])
        .unwrap());
    assert!(!f
        .cache
        .has_changed(&FileCollection::file(&input), "")
        .unwrap());
}

#[test]
fn test_on_changes_leaves_descend_combinators() {
    let inputs = FileCollection::file("in.txt");
    let outputs = FileCollection::file("out.txt");
    let nested = RunCondition::Or(vec![
        RunCondition::AtMostEvery(Duration::from_secs(60)),
        RunCondition::And(vec![
            RunCondition::on_changes(inputs.clone(), outputs.clone()),
            RunCondition::ToDelete(FileCollection::file("junk.txt")),
        ]),
    ]);

    let leaves = nested.on_changes_leaves();
    assert_eq!(leaves.len(), 1);
    assert_eq!(*leaves[0].0, inputs);
    assert_eq!(*leaves[0].1, outputs);

    assert!(RunCondition::Always.on_changes_leaves().is_empty());

    let bare = RunCondition::on_changes(inputs.clone(), outputs);
    assert_eq!(bare.on_changes_leaves().len(), 1);
}

#[test]
fn test_always_runs_classification() {
    assert!(RunCondition::Always.always_runs());
    assert!(!RunCondition::on_changes(FileCollection::empty(), FileCollection::empty()).always_runs());
    assert!(RunCondition::Or(vec![
        RunCondition::Always,
        RunCondition::AtMostEvery(Duration::from_secs(1)),
    ])
    .always_runs());
    assert!(!RunCondition::And(vec![
        RunCondition::Always,
        RunCondition::AtMostEvery(Duration::from_secs(1)),
    ])
    .always_runs());
}
