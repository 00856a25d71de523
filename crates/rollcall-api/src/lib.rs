//! Shared domain types for rollcall
//!
//! This crate defines the vocabulary shared by the location source, the
//! acquisition engine, the attendance gate and the host UI:
//! - Fixes, fix requests and coarse location failures
//! - Reference geofence and zone verdicts
//! - Attendance types, rejection reasons and submission decisions

mod attendance;
mod types;

pub use attendance::*;
pub use types::*;
