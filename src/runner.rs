//! External command runner
//!
//! Launches one external process per call, drains stdout and stderr while
//! waiting for it to exit, and classifies the result as a [`CommandOutcome`].
//! There is no retry: a call is exactly one attempt.
//!
//! Two invocation forms are supported through [`CommandSpec`]: a single
//! shell-interpreted string, or a program plus argument list executed without a
//! shell. The forms cannot be mixed in one call.

use crate::error::{FpiError, FpiResult};
use async_trait::async_trait;
use std::fmt;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Exit code reported when the process could not be launched at all.
pub const SPAWN_FAILURE_CODE: i32 = -1;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// A full command line interpreted by the platform shell.
    Shell(String),
    /// A program and its arguments, passed to the OS verbatim.
    Exec {
        /// Program name or path.
        program: String,
        /// Arguments, no shell expansion.
        args: Vec<String>,
    },
}

impl CommandSpec {
    /// Shell form.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// Program + arguments form.
    pub fn exec<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn to_command(&self) -> Command {
        let mut command = match self {
            Self::Shell(line) => shell_command(line),
            Self::Exec { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping an in-flight run (shutdown) must not leave the child behind.
            .kill_on_drop(true);
        command
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(line) => f.write_str(line),
            Self::Exec { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// Result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exit code zero (or no exit code at all). Carries decoded stdout, which
    /// may be empty.
    Success {
        /// Decoded standard output.
        stdout: String,
    },
    /// Exit code greater than zero, or the process could not be launched.
    Failure {
        /// Process exit code, [`SPAWN_FAILURE_CODE`] if it never started.
        code: i32,
        /// The command as it was issued, for diagnostics.
        command: String,
        /// Decoded standard error.
        stderr: String,
    },
}

impl CommandOutcome {
    /// Whether the command counts as successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn from_output(spec: &CommandSpec, output: Output) -> Self {
        match output.status.code() {
            Some(code) if code > 0 => Self::Failure {
                code,
                command: spec.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            // Zero, negative, or killed by a signal with no code.
            _ => Self::Success {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            },
        }
    }
}

/// Asynchronous command execution seam.
///
/// The coordinator and the calibration-box relay only talk to this trait, so
/// tests can substitute a scripted runner.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` once and classify the result.
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome;
}

/// Runs commands as real OS processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner.
    pub fn new() -> Self {
        Self
    }

    /// Spawn the command and collect its full output.
    ///
    /// `Command::output` reads both pipes concurrently with waiting for exit, so
    /// a chatty child cannot deadlock on a full pipe buffer.
    pub async fn output(&self, spec: &CommandSpec) -> FpiResult<Output> {
        spec.to_command()
            .output()
            .await
            .map_err(|source| FpiError::Spawn {
                command: spec.to_string(),
                source,
            })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        debug!(command = %spec, "Running external command");

        match self.output(spec).await {
            Ok(output) => {
                let outcome = CommandOutcome::from_output(spec, output);
                debug!(command = %spec, success = outcome.is_success(), "Command exited");
                outcome
            }
            Err(err) => CommandOutcome::Failure {
                code: SPAWN_FAILURE_CODE,
                command: spec.to_string(),
                stderr: err.to_string(),
            },
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_success_captures_stdout() {
        let outcome = ProcessRunner::new()
            .run(&CommandSpec::shell("echo hello"))
            .await;
        assert_eq!(
            outcome,
            CommandOutcome::Success {
                stdout: "hello\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_stdout_is_empty_text() {
        let outcome = ProcessRunner::new().run(&CommandSpec::shell("true")).await;
        assert_eq!(
            outcome,
            CommandOutcome::Success {
                stdout: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_stderr() {
        let outcome = ProcessRunner::new()
            .run(&CommandSpec::shell("echo broken >&2; exit 3"))
            .await;
        match outcome {
            CommandOutcome::Failure {
                code,
                command,
                stderr,
            } => {
                assert_eq!(code, 3);
                assert_eq!(command, "echo broken >&2; exit 3");
                assert_eq!(stderr, "broken\n");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_form_does_not_use_shell() {
        let outcome = ProcessRunner::new()
            .run(&CommandSpec::exec("echo", ["$HOME", "a b"]))
            .await;
        assert_eq!(
            outcome,
            CommandOutcome::Success {
                stdout: "$HOME a b\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let spec = CommandSpec::exec("definitely-not-a-real-program-xyz", Vec::<String>::new());
        let outcome = ProcessRunner::new().run(&spec).await;
        match outcome {
            CommandOutcome::Failure { code, command, .. } => {
                assert_eq!(code, SPAWN_FAILURE_CODE);
                assert_eq!(command, "definitely-not-a-real-program-xyz");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_large_output_on_both_pipes_does_not_deadlock() {
        let line = "head -c 200000 /dev/zero | tr '\\0' a; head -c 200000 /dev/zero | tr '\\0' b >&2";
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ProcessRunner::new().output(&CommandSpec::shell(line)),
        )
        .await
        .expect("runner deadlocked")
        .expect("spawn failed");
        assert_eq!(output.stdout.len(), 200_000);
        assert_eq!(output.stderr.len(), 200_000);
    }

    #[test]
    fn test_display_joins_exec_args() {
        let spec = CommandSpec::exec("send-command", ["apogeecal", "shutterOpen"]);
        assert_eq!(spec.to_string(), "send-command apogeecal shutterOpen");
    }
}
