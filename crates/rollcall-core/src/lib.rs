//! Attendance-location engine for rollcall
//!
//! This crate is the heart of rollcall, containing:
//! - Geofence evaluation (fix + accuracy + reference circle -> zone)
//! - Freshness cache and the published-fix cell with its hysteresis rule
//! - Fix acquisition (fast -> accurate with retries -> watch)
//! - Attendance gate (duplicate check, reason check, zone check)
//! - The `AttendancePortal` facade tying them together

mod acquisition;
mod cache;
mod cell;
mod gate;
mod geofence;
mod notify;
mod portal;

pub use acquisition::*;
pub use cache::*;
pub use cell::*;
pub use gate::*;
pub use geofence::*;
pub use notify::*;
pub use portal::*;
