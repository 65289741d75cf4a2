//! Message types for actor-based communication
//!
//! Commands sent from the command surface to the [`ShutterActor`] task. Each
//! carries the notifier for its own replies and a oneshot for the outcome.
//!
//! [`ShutterActor`]: crate::actor::ShutterActor

use crate::notify::Notifier;
use crate::shutter::OperationOutcome;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Commands that can be sent to the shutter actor
pub enum ShutterCommand {
    /// Open the shutter
    Open {
        /// Reply sink for this command
        notifier: Arc<dyn Notifier>,
        /// Outcome channel
        response: oneshot::Sender<OperationOutcome>,
    },

    /// Close the shutter
    Close {
        /// Leave the calibration box alone
        no_calbox: bool,
        /// Reply sink for this command
        notifier: Arc<dyn Notifier>,
        /// Outcome channel
        response: oneshot::Sender<OperationOutcome>,
    },
}

impl ShutterCommand {
    /// Helper to create an Open command
    pub fn open(notifier: Arc<dyn Notifier>) -> (Self, oneshot::Receiver<OperationOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Open {
                notifier,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Close command
    pub fn close(
        no_calbox: bool,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, oneshot::Receiver<OperationOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Close {
                no_calbox,
                notifier,
                response: tx,
            },
            rx,
        )
    }
}
