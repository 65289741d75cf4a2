//! Test doubles for the command runner, the calibration box and the reply sink
//!
//! These let the coordinator and the actor be exercised without shutter
//! hardware. They provide:
//! - Scripted outcomes, consumed in order
//! - Simulated latency, or a call that never completes
//! - Call logging for test verification

use crate::calbox::{CalboxAction, CalboxBackend};
use crate::error::{FpiError, FpiResult};
use crate::notify::{Notifier, Reply};
use crate::runner::{CommandOutcome, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Acknowledgment printed by the shutter when it reaches the open end-stop.
pub const OPEN_ACK: &str = "Apogeefpi says \"message:shutters:high1:ok\"\n";

/// Acknowledgment printed by the shutter when it reaches the closed end-stop.
pub const CLOSE_ACK: &str = "Apogeefpi says \"message:shutters:low1:ok\"\n";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted [`CommandRunner`].
///
/// Outcomes are returned in the order they were pushed. Once the script runs
/// out, every call succeeds with empty output.
#[derive(Default)]
pub struct MockRunner {
    script: Mutex<VecDeque<CommandOutcome>>,
    calls: Mutex<Vec<CommandSpec>>,
    latency_ms: AtomicU64,
    hang: AtomicBool,
}

impl MockRunner {
    /// Create a runner with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
        self
    }

    /// Make every subsequent call wait forever.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Queue a successful run printing `stdout`.
    pub fn push_success(&self, stdout: impl Into<String>) {
        lock(&self.script).push_back(CommandOutcome::Success {
            stdout: stdout.into(),
        });
    }

    /// Queue a run exiting with `code` and printing `stderr`.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        lock(&self.script).push_back(CommandOutcome::Failure {
            code,
            command: String::new(),
            stderr: stderr.into(),
        });
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        lock(&self.calls).push(spec.clone());

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        match lock(&self.script).pop_front() {
            Some(CommandOutcome::Failure { code, stderr, .. }) => CommandOutcome::Failure {
                code,
                command: spec.to_string(),
                stderr,
            },
            Some(outcome) => outcome,
            None => CommandOutcome::Success {
                stdout: String::new(),
            },
        }
    }
}

/// Calibration box double that records every request.
#[derive(Default)]
pub struct MockCalbox {
    actions: Mutex<Vec<CalboxAction>>,
    unreachable: AtomicBool,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl MockCalbox {
    /// A calibration box that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every request by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
        self
    }

    /// Answer every request with a failed command.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Refuse to issue requests at all.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Requests received so far.
    pub fn actions(&self) -> Vec<CalboxAction> {
        lock(&self.actions).clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        lock(&self.actions).len()
    }
}

#[async_trait]
impl CalboxBackend for MockCalbox {
    async fn command(&self, action: CalboxAction) -> FpiResult<CommandOutcome> {
        lock(&self.actions).push(action);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FpiError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "calibration box unreachable",
            )));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Ok(CommandOutcome::Failure {
                code: 1,
                command: format!("calbox {action}"),
                stderr: "calibration box refused".to_string(),
            });
        }
        Ok(CommandOutcome::Success {
            stdout: String::new(),
        })
    }
}

/// Notifier that keeps every reply in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    replies: Mutex<Vec<Reply>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies received so far, in order.
    pub fn replies(&self) -> Vec<Reply> {
        lock(&self.replies).clone()
    }

    /// Forget recorded replies.
    pub fn clear(&self) {
        lock(&self.replies).clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, reply: Reply) {
        lock(&self.replies).push(reply);
    }
}
