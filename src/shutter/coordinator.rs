//! Shutter coordinator
//!
//! One open or close runs the local shutter command and, unless skipped, the
//! matching calibration-box request in the same task. Only the local result
//! decides the reported position:
//!
//! | local result                 | position    | outcome            |
//! |------------------------------|-------------|--------------------|
//! | command exits non-zero       | `Unknown`   | `Failed`           |
//! | reply does not parse         | `Unknown`   | `Failed`           |
//! | expected end-stop token      | as reported | `Finished(..)`     |
//! | the other end-stop token     | as reported | `Warned(..)`       |
//!
//! Open/close take `&mut self`, so two operations can never overlap on one
//! coordinator. Status reads go through a [`PositionReader`] snapshot and may
//! happen at any time.

use crate::calbox::{CalboxAction, CalboxBackend, CommandCalbox};
use crate::config::{Settings, ShutterSettings};
use crate::error::FpiResult;
use crate::notify::{position_keywords, Notifier};
use crate::reply::{clean_reply, parse_ack, ParsedAck, PositionToken};
use crate::runner::{CommandOutcome, CommandRunner, CommandSpec};
use crate::shutter::position::{PositionCell, PositionReader, ShutterPosition};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Requested shutter movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutterAction {
    /// Open the shutter.
    Open,
    /// Close the shutter.
    Close,
}

impl ShutterAction {
    /// Token the hardware reports when the action succeeded as requested.
    pub fn expected_token(self) -> PositionToken {
        match self {
            Self::Open => PositionToken::High1,
            Self::Close => PositionToken::Low1,
        }
    }

    fn mismatch_message(self) -> &'static str {
        match self {
            Self::Open => "Shutter returned unexpected closed status.",
            Self::Close => "Shutter returned unexpected open status.",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Close => "Close",
        }
    }
}

impl fmt::Display for ShutterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
        }
    }
}

impl From<ShutterAction> for CalboxAction {
    fn from(action: ShutterAction) -> Self {
        match action {
            ShutterAction::Open => Self::Open,
            ShutterAction::Close => Self::Close,
        }
    }
}

/// Whether an operation also commands the calibration box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalboxMode {
    /// Issue the calibration-box request alongside the local command and wait
    /// for both.
    Commanded,
    /// Local command only; the calibration box is never contacted.
    Skipped,
}

/// Terminal outcome of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The shutter reached the requested position.
    Finished(ShutterPosition),
    /// The shutter reports the opposite of what was requested.
    Warned(ShutterPosition),
    /// No reliable position could be obtained.
    Failed,
    /// Interrupted by shutdown before completing. Not a device failure.
    Cancelled,
}

impl OperationOutcome {
    /// Whether the command finished from the client's point of view.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished(_) | Self::Warned(_))
    }
}

/// Verdict of one operation before it is turned into replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// Position to record.
    pub final_position: ShutterPosition,
    /// Whether the hardware agreed with the request.
    pub matched_expectation: bool,
    /// Whether the operation failed outright.
    pub failed: bool,
}

impl ReconciliationResult {
    /// Verdict for a failed command or an unparseable reply.
    pub fn failed() -> Self {
        Self {
            final_position: ShutterPosition::Unknown,
            matched_expectation: false,
            failed: true,
        }
    }

    /// Compare the reported token against what `action` expects.
    pub fn from_token(action: ShutterAction, token: PositionToken) -> Self {
        Self {
            final_position: ShutterPosition::from(token),
            matched_expectation: token == action.expected_token(),
            failed: false,
        }
    }

    /// Client-facing outcome.
    pub fn outcome(&self) -> OperationOutcome {
        if self.failed {
            OperationOutcome::Failed
        } else if self.matched_expectation {
            OperationOutcome::Finished(self.final_position)
        } else {
            OperationOutcome::Warned(self.final_position)
        }
    }
}

/// Owns the shutter position and runs open/close/status.
pub struct ShutterCoordinator {
    runner: Arc<dyn CommandRunner>,
    calbox: Arc<dyn CalboxBackend>,
    open_command: CommandSpec,
    close_command: CommandSpec,
    calbox_enabled: bool,
    position: PositionCell,
}

impl ShutterCoordinator {
    /// Coordinator with explicit collaborators. The calibration box is
    /// commanded by default.
    pub fn new(
        shutter: &ShutterSettings,
        runner: Arc<dyn CommandRunner>,
        calbox: Arc<dyn CalboxBackend>,
    ) -> Self {
        Self {
            runner,
            calbox,
            open_command: CommandSpec::shell(shutter.open_command.clone()),
            close_command: CommandSpec::shell(shutter.close_command.clone()),
            calbox_enabled: true,
            position: PositionCell::new(),
        }
    }

    /// Coordinator wired from configuration, relaying calibration-box
    /// requests through `runner`.
    pub fn from_settings(settings: &Settings, runner: Arc<dyn CommandRunner>) -> FpiResult<Self> {
        let calbox = CommandCalbox::new(&settings.calbox, Arc::clone(&runner))?;
        Ok(Self::new(&settings.shutter, runner, Arc::new(calbox))
            .with_calbox_enabled(settings.calbox.enabled))
    }

    /// Enable or disable the calibration-box leg for every operation.
    pub fn with_calbox_enabled(mut self, enabled: bool) -> Self {
        self.calbox_enabled = enabled;
        self
    }

    /// Current believed position.
    pub fn position(&self) -> ShutterPosition {
        self.position.get()
    }

    /// Shareable read-only view of the position.
    pub fn reader(&self) -> PositionReader {
        self.position.reader()
    }

    /// Report the current position. Never changes state.
    pub fn status(&self, notifier: &dyn Notifier) -> ShutterPosition {
        let position = self.position.get();
        notifier.finish(position_keywords(position));
        position
    }

    /// Open the shutter, commanding the calibration box unless disabled.
    pub async fn open(&mut self, notifier: &dyn Notifier) -> OperationOutcome {
        let mode = self.mode(false);
        self.execute(ShutterAction::Open, mode, notifier).await
    }

    /// Close the shutter. `no_calbox` leaves the calibration box alone.
    pub async fn close(&mut self, no_calbox: bool, notifier: &dyn Notifier) -> OperationOutcome {
        let mode = self.mode(no_calbox);
        self.execute(ShutterAction::Close, mode, notifier).await
    }

    fn mode(&self, skip: bool) -> CalboxMode {
        if skip || !self.calbox_enabled {
            CalboxMode::Skipped
        } else {
            CalboxMode::Commanded
        }
    }

    fn command_for(&self, action: ShutterAction) -> &CommandSpec {
        match action {
            ShutterAction::Open => &self.open_command,
            ShutterAction::Close => &self.close_command,
        }
    }

    /// Run one operation to completion, update the position and signal the
    /// result through `notifier`.
    pub async fn execute(
        &mut self,
        action: ShutterAction,
        mode: CalboxMode,
        notifier: &dyn Notifier,
    ) -> OperationOutcome {
        info!(%action, ?mode, "Shutter operation started");

        let spec = self.command_for(action).clone();
        let (local, remote) = match mode {
            CalboxMode::Commanded => {
                let (local, remote) = tokio::join!(
                    self.runner.run(&spec),
                    self.calbox.command(CalboxAction::from(action)),
                );
                (local, Some(remote))
            }
            CalboxMode::Skipped => (self.runner.run(&spec).await, None),
        };

        // The calbox leg only matters once the local command has succeeded.
        if let (CommandOutcome::Success { .. }, Some(remote)) = (&local, remote) {
            report_calbox(action, remote, notifier);
        }

        let result = interpret(action, local, notifier);
        self.position.set(result.final_position);

        if result.failed {
            notifier.fail(position_keywords(ShutterPosition::Unknown));
        } else {
            if !result.matched_expectation {
                notifier.warn(action.mismatch_message());
            }
            notifier.finish(position_keywords(result.final_position));
        }

        let outcome = result.outcome();
        info!(%action, ?outcome, position = %result.final_position, "Shutter operation done");
        outcome
    }
}

fn interpret(
    action: ShutterAction,
    local: CommandOutcome,
    notifier: &dyn Notifier,
) -> ReconciliationResult {
    let stdout = match local {
        CommandOutcome::Failure { code, stderr, .. } => {
            notifier.error(&format!(
                "{} shutter failed with error code {code}: {}",
                action.label(),
                stderr.trim()
            ));
            return ReconciliationResult::failed();
        }
        CommandOutcome::Success { stdout } => stdout,
    };

    notifier.debug(&format!("APOGEE FPI replied with: {}", clean_reply(&stdout)));

    match parse_ack(&stdout) {
        ParsedAck::Recognized(token) => {
            debug!(%action, %token, "Shutter reply parsed");
            ReconciliationResult::from_token(action, token)
        }
        ParsedAck::Unrecognized => {
            notifier.error("Cannot parse shutter reply.");
            ReconciliationResult::failed()
        }
    }
}

fn report_calbox(
    action: ShutterAction,
    remote: FpiResult<CommandOutcome>,
    notifier: &dyn Notifier,
) {
    match remote {
        Ok(CommandOutcome::Success { .. }) => {
            debug!(%action, "Calibration box acknowledged");
        }
        Ok(CommandOutcome::Failure { code, stderr, .. }) => {
            notifier.warn(&format!(
                "Calibration box shutter {action} failed with error code {code}: {}",
                stderr.trim()
            ));
        }
        Err(err) => {
            warn!(%action, "Calibration box request not sent: {err}");
            notifier.warn(&format!("Calibration box shutter {action} not sent: {err}"));
        }
    }
}
