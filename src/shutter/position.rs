//! Shutter position state
//!
//! [`PositionCell`] is the single owner of the believed position. Writes go
//! through `&mut self`, so only the coordinator holding the cell can change it.
//! Readers hold a [`PositionReader`] and always see a complete snapshot, even
//! while an open/close operation is in flight.

use crate::reply::PositionToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Best current belief about the physical shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutterPosition {
    /// Shutter reported at its open end-stop.
    #[serde(rename = "open")]
    Open,
    /// Shutter reported at its closed end-stop.
    #[serde(rename = "closed")]
    Closed,
    /// No reliable signal has been obtained.
    #[default]
    #[serde(rename = "?")]
    Unknown,
}

impl ShutterPosition {
    /// Keyword value used in replies: `open`, `closed` or `?`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Unknown => "?",
        }
    }
}

impl fmt::Display for ShutterPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PositionToken> for ShutterPosition {
    fn from(token: PositionToken) -> Self {
        match token {
            PositionToken::High1 => Self::Open,
            PositionToken::Low1 => Self::Closed,
        }
    }
}

/// Owned, writable position state. Starts as [`ShutterPosition::Unknown`].
#[derive(Debug)]
pub struct PositionCell {
    tx: watch::Sender<ShutterPosition>,
}

impl Default for PositionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionCell {
    /// New cell holding `Unknown`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutterPosition::Unknown);
        Self { tx }
    }

    /// Current value.
    pub fn get(&self) -> ShutterPosition {
        *self.tx.borrow()
    }

    /// Replace the current value.
    pub fn set(&mut self, position: ShutterPosition) {
        self.tx.send_replace(position);
    }

    /// Read-only handle that can be cloned and shared across tasks.
    pub fn reader(&self) -> PositionReader {
        PositionReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of a [`PositionCell`].
#[derive(Debug, Clone)]
pub struct PositionReader {
    rx: watch::Receiver<ShutterPosition>,
}

impl PositionReader {
    /// Snapshot of the current value.
    pub fn get(&self) -> ShutterPosition {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unknown() {
        let cell = PositionCell::new();
        assert_eq!(cell.get(), ShutterPosition::Unknown);
        assert_eq!(cell.get().as_str(), "?");
    }

    #[test]
    fn test_reader_sees_updates() {
        let mut cell = PositionCell::new();
        let reader = cell.reader();
        cell.set(ShutterPosition::Open);
        assert_eq!(reader.get(), ShutterPosition::Open);
        cell.set(ShutterPosition::Closed);
        assert_eq!(reader.clone().get(), ShutterPosition::Closed);
    }

    #[test]
    fn test_serializes_as_keyword_values() {
        let json = serde_json::to_string(&[
            ShutterPosition::Open,
            ShutterPosition::Closed,
            ShutterPosition::Unknown,
        ])
        .unwrap();
        assert_eq!(json, r#"["open","closed","?"]"#);
    }

    #[test]
    fn test_token_mapping() {
        assert_eq!(ShutterPosition::from(PositionToken::High1), ShutterPosition::Open);
        assert_eq!(ShutterPosition::from(PositionToken::Low1), ShutterPosition::Closed);
    }
}
