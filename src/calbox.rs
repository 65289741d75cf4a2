//! Calibration-box shutter backend
//!
//! The calibration box is a separate subsystem with its own shutter. Its replies
//! are observed and reported, but they never decide the FPI shutter position.

use crate::config::CalboxSettings;
use crate::error::{FpiError, FpiResult};
use crate::runner::{CommandOutcome, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Request sent to the calibration box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalboxAction {
    /// Open its shutter.
    Open,
    /// Close its shutter.
    Close,
}

impl fmt::Display for CalboxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
        }
    }
}

/// Remote calibration-box interface.
#[async_trait]
pub trait CalboxBackend: Send + Sync {
    /// Issue `action` and report how the remote side answered.
    ///
    /// `Err` means the request could not be issued at all.
    async fn command(&self, action: CalboxAction) -> FpiResult<CommandOutcome>;
}

/// Relays calibration-box commands through an external program.
///
/// Both command lines are rendered once at construction, so template problems
/// surface at startup rather than mid-operation.
pub struct CommandCalbox {
    runner: Arc<dyn CommandRunner>,
    open: CommandSpec,
    close: CommandSpec,
}

impl CommandCalbox {
    /// Build the relay from configuration.
    pub fn new(settings: &CalboxSettings, runner: Arc<dyn CommandRunner>) -> FpiResult<Self> {
        let open = render(settings, &settings.open_command)?;
        let close = render(settings, &settings.close_command)?;
        debug!(open = %open, close = %close, "Calibration box relay configured");
        Ok(Self {
            runner,
            open,
            close,
        })
    }

    /// The command line issued for `action`.
    pub fn spec(&self, action: CalboxAction) -> &CommandSpec {
        match action {
            CalboxAction::Open => &self.open,
            CalboxAction::Close => &self.close,
        }
    }
}

fn render(settings: &CalboxSettings, command: &str) -> FpiResult<CommandSpec> {
    let vars: HashMap<String, String> = [
        ("actor".to_string(), settings.actor.clone()),
        ("command".to_string(), command.to_string()),
    ]
    .into_iter()
    .collect();

    let args = settings
        .args
        .iter()
        .map(|template| {
            strfmt::strfmt(template, &vars).map_err(|err| FpiError::Template {
                template: template.clone(),
                reason: err.to_string(),
            })
        })
        .collect::<FpiResult<Vec<_>>>()?;

    Ok(CommandSpec::exec(settings.program.clone(), args))
}

#[async_trait]
impl CalboxBackend for CommandCalbox {
    async fn command(&self, action: CalboxAction) -> FpiResult<CommandOutcome> {
        let spec = self.spec(action);
        let outcome = self.runner.run(spec).await;
        if let CommandOutcome::Failure { code, stderr, .. } = &outcome {
            warn!(%action, code, stderr = %stderr.trim(), "Calibration box command failed");
        }
        Ok(outcome)
    }
}
