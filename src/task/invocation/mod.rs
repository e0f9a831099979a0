// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Invocation parsing: from positional tokens to validated
//! `(task, args)` pairs.
//!
//! ```text
//! [a, :X, :Y, b, :Z]
//!    a --> args [X, Y]
//!    b --> args [Z]
//!        |
//!        v
//! [(a, [X, Y]), (b, [Z])]
//! ```
//!
//! Tokens starting with `:` are arguments to the most recently named
//! task; everything else must name a declared task. Problems are
//! collected and reported together. When no task is named the graph's
//! default tasks are selected.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DartleResult, InvocationError};
use crate::task::TaskInvocation;
use crate::task::graph::TaskGraph;

/// Parses positional command-line tokens into task invocations.
///
/// Exact duplicates are dropped while preserving first-seen order, and
/// each invocation's args are checked against the task's validator.
///
/// # Errors
///
/// Returns all collected problems, jointly when there is more than one:
/// arguments preceding any task, unknown task names (with a similarity
/// suggestion logged at debug level), validator rejections, and an empty
/// selection with no default tasks.
pub fn parse_invocations(
    tokens: &[String],
    graph: &TaskGraph,
) -> DartleResult<Vec<TaskInvocation>> {
    let mut problems = Vec::new();
    let mut selections: Vec<(String, Vec<String>)> = Vec::new();

    for token in tokens {
        if let Some(arg) = token.strip_prefix(':') {
            match selections.last_mut() {
                Some((_, args)) => args.push(arg.to_string()),
                None => problems.push(InvocationError::ArgumentBeforeTask {
                    arg: arg.to_string(),
                }),
            }
        } else if graph.get(token).is_some() {
            selections.push((token.clone(), Vec::new()));
        } else {
            let suggestion = find_similar(token, graph.task_names().iter().map(String::as_str));
            if let Some(ref close) = suggestion {
                tracing::debug!(unknown = %token, suggestion = %close, "Unknown task has a close match");
            }
            problems.push(InvocationError::TaskDoesNotExist {
                name: token.clone(),
                suggestion,
            });
        }
    }

    if selections.is_empty() && problems.is_empty() {
        selections = graph
            .default_tasks()
            .iter()
            .map(|t| (t.name().to_string(), Vec::new()))
            .collect();
        if selections.is_empty() {
            problems.push(InvocationError::NothingToRun);
        }
    }

    let mut seen = BTreeSet::new();
    let mut invocations = Vec::new();
    for (name, args) in selections {
        if let Some(task) = graph.get(&name)
            && let Err(reason) = task.task().args_validator().validate(&args)
        {
            problems.push(InvocationError::InvalidArgs {
                task: name.clone(),
                args: args.clone(),
                reason,
            });
            continue;
        }
        let invocation = TaskInvocation::new(name, args);
        if seen.insert(invocation.clone()) {
            invocations.push(invocation);
        }
    }

    if problems.is_empty() {
        Ok(invocations)
    } else {
        Err(InvocationError::combined(problems).into())
    }
}

static WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z]{2,}|[A-Z][a-z0-9]*|[a-z0-9]+").expect("word pattern is valid")
});

/// Splits an identifier into lowercase words on camel-case humps and
/// separators (`show-task-graph` and `showTaskGraph` tokenize alike).
fn words(identifier: &str) -> Vec<String> {
    WORDS
        .find_iter(identifier)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

/// Finds the closest candidate by word-prefix matching.
///
/// A candidate matches when every word of the query is a prefix of the
/// candidate's word at the same position; the shortest such candidate
/// wins, ties broken alphabetically. Used for task-name and option-name
/// typos alike.
pub fn find_similar<'a>(
    query: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let query_words = words(query);
    if query_words.is_empty() {
        return None;
    }

    let mut best: Option<&str> = None;
    for candidate in candidates {
        if candidate == query {
            continue;
        }
        let candidate_words = words(candidate);
        if candidate_words.len() < query_words.len() {
            continue;
        }
        let all_match = query_words
            .iter()
            .zip(&candidate_words)
            .all(|(q, c)| c.starts_with(q.as_str()));
        if !all_match {
            continue;
        }
        let better = match best {
            None => true,
            Some(current) => (candidate.len(), candidate) < (current.len(), current),
        };
        if better {
            best = Some(candidate);
        }
    }
    best.map(String::from)
}

#[cfg(test)]
mod tests;
