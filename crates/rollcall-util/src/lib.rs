//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (PersonId, AttendanceTypeId, RecordId, WatchId)
//! - Time utilities (monotonic time, mock-able wall clock)
//! - Error types
//! - Default paths for config, data, and log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
