//! Priority notification stack
//!
//! This module provides:
//! - **Manager**: active set plus queue with admission, eviction and ordering
//! - **Entries**: notification values, priorities and show options
//! - **Surface**: the host rendering boundary
//!
//! Ordering is `(priority desc, sequence desc)`; the first active item is
//! [`Slot::Primary`], the rest [`Slot::Secondary`].

mod entry;
mod manager;
mod surface;


pub use entry::{NotificationCallback, NotificationConfig, NotificationId, Priority};
pub use manager::{
    NotificationDiagnostics, NotificationHandle, NotificationManager, NotificationSnapshot,
};
pub use surface::{NotificationSurface, NotificationView, NullSurface, Slot, SurfaceError};
