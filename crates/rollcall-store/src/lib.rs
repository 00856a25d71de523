//! Persistence layer for rollcall
//!
//! Provides:
//! - Attendance records (one per person, day and attendance type)
//! - Same-day duplicate checks
//! - Audit log (append-only)

mod audit;
mod record;
mod sqlite;
mod traits;

pub use audit::*;
pub use record::*;
pub use sqlite::*;
pub use traits::*;

use chrono::NaiveDate;
use rollcall_util::{AttendanceTypeId, PersonId};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record already exists for {person_id} / {attendance_type} on {day}")]
    Duplicate {
        person_id: PersonId,
        attendance_type: AttendanceTypeId,
        day: NaiveDate,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
