//! Host rendering surface
//!
//! The manager never creates or styles elements itself. Every visible side
//! effect goes through a [`NotificationSurface`]; failures are logged by the
//! manager and never block a state transition.

use serde::Serialize;
use thiserror::Error;

use super::{NotificationId, Priority};

/// Screen position of an active notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Most important, most recent item
    Primary,
    Secondary,
}

/// What the surface needs to draw a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationView {
    pub id: NotificationId,
    pub message: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surface {op} failed: {reason}")]
pub struct SurfaceError {
    pub op: &'static str,
    pub reason: String,
}

impl SurfaceError {
    pub fn new(op: &'static str, reason: impl Into<String>) -> Self {
        Self {
            op,
            reason: reason.into(),
        }
    }
}

pub trait NotificationSurface {
    fn attach(&self, view: &NotificationView) -> Result<(), SurfaceError>;

    fn detach(&self, id: NotificationId) -> Result<(), SurfaceError>;

    fn set_message(&self, id: NotificationId, message: &str) -> Result<(), SurfaceError>;

    /// Position the active set, primary first.
    fn layout(&self, order: &[(NotificationId, Slot)]) -> Result<(), SurfaceError>;
}

/// Surface for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl NotificationSurface for NullSurface {
    fn attach(&self, _view: &NotificationView) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn detach(&self, _id: NotificationId) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn set_message(&self, _id: NotificationId, _message: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn layout(&self, _order: &[(NotificationId, Slot)]) -> Result<(), SurfaceError> {
        Ok(())
    }
}
