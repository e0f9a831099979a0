// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

use super::{find_similar, parse_invocations};
use crate::error::{DartleError, InvocationError};
use crate::task::graph::TaskGraph;
use crate::task::{ArgsValidator, PhaseRegistry, Task, TaskInvocation};

fn task(name: &str) -> Task {
    Task::new(name, |_ctx| async { Ok(()) })
}

fn graph(tasks: Vec<Task>) -> TaskGraph {
    TaskGraph::new(tasks, PhaseRegistry::new()).unwrap()
}

fn tokens(raw: &[&str]) -> Vec<String> {
    raw.iter().map(ToString::to_string).collect()
}

fn unwrap_invocation_error(result: Result<Vec<TaskInvocation>, DartleError>) -> InvocationError {
    match result {
        Err(DartleError::Invocation(e)) => *e,
        other => panic!("expected invocation error, got {other:?}"),
    }
}

#[test]
fn test_args_bind_to_preceding_task() {
    let g = graph(vec![
        task("a").with_args_validator(ArgsValidator::AcceptAny),
        task("b").with_args_validator(ArgsValidator::AcceptAny),
    ]);
    let invocations = parse_invocations(&tokens(&["a", ":X", ":Y", "b", ":Z"]), &g).unwrap();
    assert_eq!(
        invocations,
        vec![
            TaskInvocation::new("a", vec!["X".to_string(), "Y".to_string()]),
            TaskInvocation::new("b", vec!["Z".to_string()]),
        ]
    );
}

#[test]
fn test_argument_before_any_task() {
    let g = graph(vec![task("a")]);
    let err = unwrap_invocation_error(parse_invocations(&tokens(&[":foo", "a"]), &g));
    assert_eq!(err.to_string(), "Argument should follow a task: ':foo'");
}

#[test]
fn test_unknown_task() {
    let g = graph(vec![task("a")]);
    let err = unwrap_invocation_error(parse_invocations(&tokens(&["bad-task"]), &g));
    assert_eq!(err.to_string(), "Task 'bad-task' does not exist");
}

#[test]
fn test_multiple_problems_reported_together() {
    let g = graph(vec![task("a")]);
    let err = unwrap_invocation_error(parse_invocations(&tokens(&[":foo", "bad-task"]), &g));
    let message = err.to_string();
    assert!(message.starts_with("Several invocation problems found:"));
    assert!(message.contains("Argument should follow a task: ':foo'"));
    assert!(message.contains("Task 'bad-task' does not exist"));
}

#[test]
fn test_arity_validation_too_few() {
    let g = graph(vec![task("d").with_args_validator(ArgsValidator::Count(1))]);
    let err = unwrap_invocation_error(parse_invocations(&tokens(&["d"]), &g));
    assert_eq!(
        err.to_string(),
        "Invalid arguments for task 'd': [] - exactly 1 argument is expected"
    );
}

#[test]
fn test_arity_validation_too_many() {
    let g = graph(vec![task("d").with_args_validator(ArgsValidator::Count(1))]);
    let err = unwrap_invocation_error(parse_invocations(&tokens(&["d", ":x", ":z"]), &g));
    assert_eq!(
        err.to_string(),
        "Invalid arguments for task 'd': [x, z] - exactly 1 argument is expected"
    );
}

#[test]
fn test_default_validator_accepts_zero_args_only() {
    let g = graph(vec![task("plain")]);
    parse_invocations(&tokens(&["plain"]), &g).unwrap();

    let err = unwrap_invocation_error(parse_invocations(&tokens(&["plain", ":x"]), &g));
    assert_eq!(
        err.to_string(),
        "Invalid arguments for task 'plain': [x] - no arguments are expected"
    );
}

#[test]
fn test_range_validator() {
    let g = graph(vec![task("r").with_args_validator(ArgsValidator::Range {
        min: 1,
        max: 2,
    })]);
    parse_invocations(&tokens(&["r", ":one"]), &g).unwrap();
    let err = unwrap_invocation_error(parse_invocations(&tokens(&["r"]), &g));
    assert_eq!(
        err.to_string(),
        "Invalid arguments for task 'r': [] - between 1 and 2 arguments are expected"
    );
}

#[test]
fn test_no_tasks_selects_defaults() {
    let g = graph(vec![
        task("a").with_default(true),
        task("b"),
        task("c").with_default(true),
    ]);
    let invocations = parse_invocations(&[], &g).unwrap();
    assert_eq!(
        invocations,
        vec![TaskInvocation::no_args("a"), TaskInvocation::no_args("c")]
    );
}

#[test]
fn test_no_tasks_and_no_defaults_is_an_error() {
    let g = graph(vec![task("a")]);
    let err = unwrap_invocation_error(parse_invocations(&[], &g));
    assert!(matches!(err, InvocationError::NothingToRun));
}

#[test]
fn test_exact_duplicates_dropped_order_preserved() {
    let g = graph(vec![
        task("a").with_args_validator(ArgsValidator::AcceptAny),
        task("b"),
    ]);
    let invocations =
        parse_invocations(&tokens(&["b", "a", ":x", "b", "a", ":y"]), &g).unwrap();
    assert_eq!(
        invocations,
        vec![
            TaskInvocation::no_args("b"),
            TaskInvocation::new("a", vec!["x".to_string()]),
            TaskInvocation::new("a", vec!["y".to_string()]),
        ]
    );
}

#[test]
fn test_same_task_different_args_kept() {
    let g = graph(vec![task("t").with_args_validator(ArgsValidator::AcceptAny)]);
    let invocations = parse_invocations(&tokens(&["t", ":a", "t", ":b"]), &g).unwrap();
    assert_eq!(invocations.len(), 2);
}

#[test]
fn test_similarity_prefix_match() {
    let names = ["compileJava", "compileTests", "deploy"];
    assert_eq!(
        find_similar("compJav", names),
        Some("compileJava".to_string())
    );
    assert_eq!(find_similar("depl", names), Some("deploy".to_string()));
    assert_eq!(find_similar("xyz", names), None);
}

#[test]
fn test_similarity_tokenizes_separators_like_camel_case() {
    let names = ["show-task-graph", "show-tasks"];
    assert_eq!(
        find_similar("showTask", names),
        Some("show-tasks".to_string())
    );
}

#[test]
fn test_similarity_prefers_shortest() {
    let names = ["clean", "cleanCache"];
    assert_eq!(find_similar("cle", names), Some("clean".to_string()));
}

#[test]
fn test_unknown_task_gets_suggestion() {
    let g = graph(vec![task("compileJava")]);
    let err = unwrap_invocation_error(parse_invocations(&tokens(&["compJava"]), &g));
    match err {
        InvocationError::TaskDoesNotExist { name, suggestion } => {
            assert_eq!(name, "compJava");
            assert_eq!(suggestion, Some("compileJava".to_string()));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
