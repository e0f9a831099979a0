// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

//! Command-line option parsing using clap derive.
//!
//! # Option Surface
//!
//! ```text
//! dartle [options] [task [:arg ...]]...
//!   -p, --parallel-tasks    --no-parallel-tasks
//!   -f, --force
//!   -s, --show-tasks        -g, --show-task-graph
//!   -l, --log-level <fine|debug|info|warn|error>
//!   --no-color (--no-colorful-log)
//!   --disable-cache
//!   -h, --help              -V, --version
//! ```
//!
//! Positional tokens are task names and `:`-prefixed task arguments;
//! their grammar lives in the invocation parser. Unknown options map to
//! the dedicated option error (exit code 4), with a closest-match
//! suggestion computed the same way as for task-name typos.

use clap::Parser;
use clap::error::ErrorKind;

use crate::error::{DartleError, InvocationError, OptionError};
use crate::logging::LogLevel;
use crate::task::invocation::find_similar;

/// Every long option, for unknown-option suggestions.
const KNOWN_OPTIONS: &[&str] = &[
    "--parallel-tasks",
    "--no-parallel-tasks",
    "--force",
    "--show-tasks",
    "--show-task-graph",
    "--log-level",
    "--no-color",
    "--no-colorful-log",
    "--disable-cache",
    "--help",
    "--version",
];

/// Parsed command-line options for one run.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "dartle",
    version,
    about = "A programmable, task-based, incremental build engine",
    after_help = "TASK ARGUMENTS:\n\n\
                  Positional tokens select tasks by name. A token starting\n\
                  with ':' is passed as an argument to the most recently\n\
                  named task: `dartle encode :fast deploy` invokes `encode`\n\
                  with [fast] and `deploy` with no arguments. Without any\n\
                  task names, the tasks marked as default are selected."
)]
pub struct Options {
    /// Runs each task of a parallel group on its own isolated worker.
    #[arg(short = 'p', long = "parallel-tasks")]
    pub parallel_tasks: bool,

    /// Forces serial execution on the main worker.
    #[arg(long = "no-parallel-tasks", conflicts_with = "parallel_tasks")]
    pub no_parallel_tasks: bool,

    /// Runs selected tasks even if they are up-to-date.
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Prints the task list grouped by phase and the planned execution
    /// order, then exits.
    #[arg(short = 's', long = "show-tasks")]
    pub show_tasks: bool,

    /// Prints the dependency graph of the selected tasks as a tree, then
    /// exits.
    #[arg(short = 'g', long = "show-task-graph")]
    pub show_task_graph: bool,

    /// Console log level.
    #[arg(short = 'l', long = "log-level", value_parser = parse_level)]
    pub log_level: Option<LogLevel>,

    /// Disables ANSI styling.
    #[arg(long = "no-color", alias = "no-colorful-log")]
    pub no_color: bool,

    /// Bypasses all cache reads and writes for this run.
    #[arg(long = "disable-cache")]
    pub disable_cache: bool,

    /// Task names and `:arg` task arguments.
    #[arg(value_name = "TASKS")]
    pub tokens: Vec<String>,
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    value.parse()
}

/// What parsing produced: options to run with, or text to print before a
/// clean exit (help and version requests).
#[derive(Debug)]
pub enum ParseOutcome {
    Run(Options),
    Print(String),
}

/// Parses command-line arguments.
///
/// # Errors
///
/// Unknown options become [`OptionError`] (exit code 4) with a
/// word-prefix suggestion when one is close enough; other parse failures
/// (a bad `--log-level` value, conflicting flags) are invocation
/// problems (exit code 1).
pub fn parse_args<I, T>(args: I) -> Result<ParseOutcome, DartleError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Options::try_parse_from(args) {
        Ok(options) => Ok(ParseOutcome::Run(options)),
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                Ok(ParseOutcome::Print(error.to_string()))
            }
            ErrorKind::UnknownArgument => {
                let option = unknown_argument_of(&error);
                let suggestion =
                    find_similar(option.trim_start_matches('-'), trimmed_known_options());
                if let Some(ref close) = suggestion {
                    tracing::debug!(unknown = %option, suggestion = %close, "Unknown option has a close match");
                }
                Err(OptionError { option, suggestion }.into())
            }
            _ => Err(InvocationError::BadOptionValue {
                message: error.to_string().trim_end().to_string(),
            }
            .into()),
        },
    }
}

/// The offending token of an unknown-argument error.
fn unknown_argument_of(error: &clap::Error) -> String {
    use clap::error::ContextKind;
    error
        .get(ContextKind::InvalidArg)
        .map_or_else(|| "<unknown>".to_string(), ToString::to_string)
}

fn trimmed_known_options() -> impl Iterator<Item = &'static str> {
    KNOWN_OPTIONS
        .iter()
        .map(|option| option.trim_start_matches('-'))
}
