//! Command surface
//!
//! Turns text command lines into actor requests and replies. A line is an
//! optional numeric command id followed by the command and its options:
//!
//! ```text
//! 12 close --no-calbox
//! status
//! ```
//!
//! Commands are parsed with `clap`, so `help` and `<command> --help` work as
//! usual and bad options are reported with clap's own diagnostics.

use crate::actor::ShutterHandle;
use crate::error::{FpiError, FpiResult};
use crate::notify::{Keywords, Notifier, ScopedNotifier};
use crate::shutter::{OperationOutcome, ShutterPosition};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Commands accepted by the actor.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ActorCommand {
    /// Reports the assumed position of the FPI shutter.
    Status,
    /// Opens the FPI shutter.
    Open,
    /// Closes the FPI shutter.
    Close {
        /// Do not command the calbox shutter.
        #[arg(long)]
        no_calbox: bool,
    },
    /// Pings the actor.
    Ping,
    /// Reports the actor version.
    Version,
}

#[derive(Parser, Debug)]
#[command(
    name = "apogeefpi",
    no_binary_name = true,
    disable_version_flag = true,
    about = "APOGEE FPI shutter actor commands."
)]
struct CommandLine {
    #[command(subcommand)]
    command: ActorCommand,
}

/// How a dispatched command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Finished, possibly with warnings.
    Finished,
    /// Failed.
    Failed,
    /// Interrupted by shutdown.
    Cancelled,
}

/// Split an optional leading command id from the rest of the line.
pub fn split_command_id(line: &str) -> (u32, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((first, rest)) => match first.parse() {
            Ok(id) => (id, rest.trim_start()),
            Err(_) => (0, line),
        },
        None => match line.parse() {
            Ok(id) => (id, ""),
            Err(_) => (0, line),
        },
    }
}

/// Parse the words of a command.
pub fn parse_command(words: &str) -> Result<ActorCommand, clap::Error> {
    CommandLine::try_parse_from(words.split_whitespace()).map(|line| line.command)
}

fn text_keywords(text: impl Into<String>) -> Keywords {
    let mut data = Keywords::new();
    data.insert("text".to_string(), Value::String(text.into()));
    data
}

/// Dispatches command lines to the shutter actor.
pub struct CommandSurface {
    handle: ShutterHandle,
    notifier: Arc<dyn Notifier>,
}

impl CommandSurface {
    /// Surface talking to `handle`, replying through `notifier`.
    pub fn new(handle: ShutterHandle, notifier: Arc<dyn Notifier>) -> Self {
        Self { handle, notifier }
    }

    /// Current position snapshot.
    pub fn position(&self) -> ShutterPosition {
        self.handle.position()
    }

    /// Handle one raw line. Blank lines are ignored and return `None`.
    pub async fn dispatch_line(&self, line: &str) -> Option<CommandStatus> {
        let (command_id, words) = split_command_id(line);
        if words.is_empty() {
            return None;
        }
        debug!(command_id, words, "Command received");

        let notifier = ScopedNotifier::new(Arc::clone(&self.notifier), command_id);
        let status = match parse_command(words) {
            Ok(command) => self.execute(command_id, command).await,
            Err(err) if err.kind() == ErrorKind::DisplayHelp => {
                notifier.finish(text_keywords(err.render().to_string()));
                CommandStatus::Finished
            }
            Err(err) => {
                let reason = FpiError::Surface(err.render().to_string().trim().to_string());
                notifier.error(&reason.to_string());
                notifier.fail(Keywords::new());
                CommandStatus::Failed
            }
        };
        Some(status)
    }

    /// Run an already parsed command.
    pub async fn execute(&self, command_id: u32, command: ActorCommand) -> CommandStatus {
        let notifier: Arc<dyn Notifier> =
            Arc::new(ScopedNotifier::new(Arc::clone(&self.notifier), command_id));

        match command {
            ActorCommand::Status => {
                self.handle.status(notifier.as_ref());
                CommandStatus::Finished
            }
            ActorCommand::Open => Self::settle(self.handle.open(notifier).await),
            ActorCommand::Close { no_calbox } => {
                Self::settle(self.handle.close(no_calbox, notifier).await)
            }
            ActorCommand::Ping => {
                notifier.finish(text_keywords("Pong."));
                CommandStatus::Finished
            }
            ActorCommand::Version => {
                let mut data = Keywords::new();
                data.insert(
                    "version".to_string(),
                    Value::String(env!("CARGO_PKG_VERSION").to_string()),
                );
                notifier.finish(data);
                CommandStatus::Finished
            }
        }
    }

    fn settle(result: FpiResult<OperationOutcome>) -> CommandStatus {
        match result {
            Ok(outcome) if outcome.is_finished() => CommandStatus::Finished,
            Ok(OperationOutcome::Cancelled) => CommandStatus::Cancelled,
            Ok(_) => CommandStatus::Failed,
            Err(err) => {
                info!("Command dropped: {err}");
                CommandStatus::Cancelled
            }
        }
    }

    /// Read command lines until EOF.
    ///
    /// Every line runs as its own task, so `status` is answered while an open
    /// or close is still in flight. The actor queue keeps open and close in
    /// the order they were read. Returns once EOF is reached and every
    /// dispatched command has settled.
    pub async fn serve<R>(self: Arc<Self>, reader: R) -> FpiResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut in_flight = JoinSet::new();
        while let Some(line) = lines.next_line().await? {
            let surface = Arc::clone(&self);
            in_flight.spawn(async move { surface.dispatch_line(&line).await });
            while let Some(joined) = in_flight.try_join_next() {
                Self::reap(joined);
            }
        }
        info!("Command stream closed");

        while let Some(joined) = in_flight.join_next().await {
            Self::reap(joined);
        }
        Ok(())
    }

    fn reap(joined: Result<Option<CommandStatus>, JoinError>) {
        if let Err(err) = joined {
            warn!("Command task ended abnormally: {err}");
        }
    }
}
