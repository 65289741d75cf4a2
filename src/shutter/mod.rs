//! FPI shutter state and the open/close/status protocol.

pub mod coordinator;
pub mod position;

pub use self::coordinator::{
    CalboxMode, OperationOutcome, ReconciliationResult, ShutterAction, ShutterCoordinator,
};
pub use self::position::{PositionCell, PositionReader, ShutterPosition};
