//! Actor task owning the shutter coordinator
//!
//! All open/close operations are processed by a single async task, one at a
//! time, so the position is never written by two operations at once. Status
//! reads bypass the queue and read the position snapshot directly, which keeps
//! them answerable while a slow shutter command is in flight.
//!
//! Shutdown is a oneshot signal. An operation still running when it arrives is
//! dropped (its child processes are killed), its caller receives
//! [`OperationOutcome::Cancelled`], and no error or fail reply is emitted.

use crate::error::{FpiError, FpiResult};
use crate::messages::ShutterCommand;
use crate::notify::{position_keywords, Notifier};
use crate::shutter::{OperationOutcome, PositionReader, ShutterCoordinator, ShutterPosition};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Queue depth between the command surface and the actor.
pub const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Actor that serializes shutter operations
pub struct ShutterActor {
    coordinator: ShutterCoordinator,
    notifier: Arc<dyn Notifier>,
}

impl ShutterActor {
    /// Wrap a coordinator. `notifier` receives unsolicited replies.
    pub fn new(coordinator: ShutterCoordinator, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            coordinator,
            notifier,
        }
    }

    /// Spawn the actor on the current Tokio runtime.
    pub fn spawn(self) -> (ShutterHandle, RunningActor) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = ShutterHandle {
            tx,
            position: self.coordinator.reader(),
        };
        let task = tokio::spawn(self.run(rx, shutdown_rx));
        (
            handle,
            RunningActor {
                shutdown_tx,
                task,
            },
        )
    }

    /// Runs the actor event loop until shutdown or until every handle is dropped.
    pub async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<ShutterCommand>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        info!("Shutter actor started");
        self.notifier
            .info(position_keywords(self.coordinator.position()));

        loop {
            let command = tokio::select! {
                _ = &mut shutdown_rx => break,
                command = command_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let (outcome, response) = match command {
                ShutterCommand::Open { notifier, response } => {
                    let operation = self.coordinator.open(notifier.as_ref());
                    (cancellable(operation, &mut shutdown_rx).await, response)
                }
                ShutterCommand::Close {
                    no_calbox,
                    notifier,
                    response,
                } => {
                    let operation = self.coordinator.close(no_calbox, notifier.as_ref());
                    (cancellable(operation, &mut shutdown_rx).await, response)
                }
            };

            match outcome {
                Some(outcome) => {
                    let _ = response.send(outcome);
                }
                None => {
                    info!("Shutdown requested, in-flight shutter operation cancelled");
                    let _ = response.send(OperationOutcome::Cancelled);
                    break;
                }
            }
        }

        info!(position = %self.coordinator.position(), "Shutter actor shutting down");
    }
}

/// Race `operation` against shutdown. `None` means shutdown won.
async fn cancellable<F>(operation: F, shutdown_rx: &mut oneshot::Receiver<()>) -> Option<OperationOutcome>
where
    F: Future<Output = OperationOutcome>,
{
    tokio::select! {
        outcome = operation => Some(outcome),
        _ = shutdown_rx => None,
    }
}

/// The spawned actor task.
pub struct RunningActor {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningActor {
    /// Signal shutdown and wait for the task to finish its cleanup.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.task.await {
            warn!("Shutter actor task ended abnormally: {err}");
        }
    }
}

/// Cloneable client for the shutter actor
#[derive(Clone)]
pub struct ShutterHandle {
    tx: mpsc::Sender<ShutterCommand>,
    position: PositionReader,
}

impl ShutterHandle {
    /// Snapshot of the believed position.
    pub fn position(&self) -> ShutterPosition {
        self.position.get()
    }

    /// Report the current position. Does not wait for in-flight operations.
    pub fn status(&self, notifier: &dyn Notifier) -> ShutterPosition {
        let position = self.position.get();
        notifier.finish(position_keywords(position));
        position
    }

    /// Queue an open operation and wait for its outcome.
    pub async fn open(&self, notifier: Arc<dyn Notifier>) -> FpiResult<OperationOutcome> {
        self.request(ShutterCommand::open(notifier)).await
    }

    /// Queue a close operation and wait for its outcome.
    pub async fn close(
        &self,
        no_calbox: bool,
        notifier: Arc<dyn Notifier>,
    ) -> FpiResult<OperationOutcome> {
        self.request(ShutterCommand::close(no_calbox, notifier)).await
    }

    async fn request(
        &self,
        (command, rx): (ShutterCommand, oneshot::Receiver<OperationOutcome>),
    ) -> FpiResult<OperationOutcome> {
        self.tx
            .send(command)
            .await
            .map_err(|_| FpiError::ActorStopped)?;
        rx.await.map_err(|_| FpiError::ActorStopped)
    }
}
