//! Common test utilities for shutter actor integration tests
//!
//! This module provides reusable setup for:
//! - Coordinators wired to scripted doubles
//! - Spawned actors with recording notifiers
//! - Reply inspection helpers

#![allow(dead_code)] // Utilities may not all be used by every test binary

use apogee_fpi::actor::{RunningActor, ShutterActor, ShutterHandle};
use apogee_fpi::config::ShutterSettings;
use apogee_fpi::mock::{MockCalbox, MockRunner, RecordingNotifier};
use apogee_fpi::notify::MessageCode;
use apogee_fpi::ShutterCoordinator;
use std::sync::Arc;

/// Doubles shared by a coordinator under test.
pub struct Rig {
    pub runner: Arc<MockRunner>,
    pub calbox: Arc<MockCalbox>,
    pub replies: Arc<RecordingNotifier>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with(MockRunner::new(), MockCalbox::new())
    }

    pub fn with(runner: MockRunner, calbox: MockCalbox) -> Self {
        Self {
            runner: Arc::new(runner),
            calbox: Arc::new(calbox),
            replies: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn coordinator(&self) -> ShutterCoordinator {
        ShutterCoordinator::new(
            &ShutterSettings::default(),
            self.runner.clone(),
            self.calbox.clone(),
        )
    }

    /// Spawn an actor whose unsolicited replies go to `self.replies`.
    pub fn spawn(&self) -> (ShutterHandle, RunningActor) {
        ShutterActor::new(self.coordinator(), self.replies.clone()).spawn()
    }
}

/// Message codes of every recorded reply, in order.
pub fn codes(notifier: &RecordingNotifier) -> Vec<MessageCode> {
    notifier.replies().iter().map(|reply| reply.code).collect()
}
