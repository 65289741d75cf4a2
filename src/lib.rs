//! Core library for the APOGEE FPI shutter actor.
//!
//! The actor drives the FPI shutter through an external shell command, asks
//! the calibration box to move its own shutter at the same time, and reports a
//! single reconciled shutter position back to the commanding client.
//!
//! - [`runner`] launches external commands and classifies their exit.
//! - [`reply`] parses the shutter's acknowledgment.
//! - [`shutter`] holds the position state and the open/close/status protocol.
//! - [`calbox`] relays requests to the calibration box.
//! - [`actor`] and [`surface`] serialize operations and turn command lines
//!   into replies.

pub mod actor;
pub mod calbox;
pub mod config;
pub mod error;
pub mod messages;
pub mod mock;
pub mod notify;
pub mod reply;
pub mod runner;
pub mod shutter;
pub mod surface;

pub use actor::{RunningActor, ShutterActor, ShutterHandle};
pub use config::Settings;
pub use error::{FpiError, FpiResult};
pub use shutter::{OperationOutcome, ShutterCoordinator, ShutterPosition};
