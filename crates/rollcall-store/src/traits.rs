//! Store trait definitions

use chrono::NaiveDate;
use rollcall_util::{AttendanceTypeId, PersonId};

use crate::{AttendanceRecord, AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Attendance records

    /// Whether a record exists for this person, day and attendance type
    fn exists(
        &self,
        person_id: &PersonId,
        day: NaiveDate,
        attendance_type: &AttendanceTypeId,
    ) -> StoreResult<bool>;

    /// Append a record; a second record for the same person, day and type
    /// fails with [`crate::StoreError::Duplicate`]
    fn append(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// All records of a person on a day, oldest first
    fn records_for_day(&self, person_id: &PersonId, day: NaiveDate)
        -> StoreResult<Vec<AttendanceRecord>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
