//! Audit event types

use chrono::{DateTime, Local};
use rollcall_api::{LocationFailure, RejectReason, Zone};
use rollcall_util::{AttendanceTypeId, PersonId, RecordId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Settings loaded/reloaded
    SettingsLoaded {
        geofence_configured: bool,
        attendance_types: usize,
    },

    /// Submission accepted and recorded
    SubmissionAccepted {
        record_id: RecordId,
        person_id: PersonId,
        attendance_type: AttendanceTypeId,
        zone: Option<Zone>,
        warned: bool,
    },

    /// Submission rejected by the gate
    SubmissionRejected {
        person_id: PersonId,
        attendance_type: AttendanceTypeId,
        reason: RejectReason,
    },

    /// User asked for a fresh location
    LocationRefreshed,

    /// Acquisition ended without any fix
    AcquisitionFailed { failure: LocationFailure },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: rollcall_util::now(),
            event,
        }
    }
}
