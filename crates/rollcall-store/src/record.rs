//! Attendance record types

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{Fix, Zone, ZoneVerdict};
use rollcall_util::{AttendanceTypeId, PersonId, RecordId};
use serde::{Deserialize, Serialize};

/// Location evidence stored with a presence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub distance_m: Option<f64>,
    pub zone: Zone,
}

impl RecordedLocation {
    pub fn new(fix: &Fix, verdict: &ZoneVerdict) -> Self {
        Self {
            latitude: fix.latitude(),
            longitude: fix.longitude(),
            accuracy_m: fix.accuracy_m,
            distance_m: verdict.distance_m,
            zone: verdict.zone,
        }
    }
}

/// One accepted attendance submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub person_id: PersonId,
    pub attendance_type: AttendanceTypeId,

    /// Local calendar day the record counts for
    pub day: NaiveDate,
    pub timestamp: DateTime<Local>,

    /// Raw fix and verdict; absent for declaration types
    pub location: Option<RecordedLocation>,

    /// Free-text reason; required for declaration types
    pub reason: Option<String>,
}

impl AttendanceRecord {
    pub fn new(
        person_id: PersonId,
        attendance_type: AttendanceTypeId,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            person_id,
            attendance_type,
            day: timestamp.date_naive(),
            timestamp,
            location: None,
            reason: None,
        }
    }

    pub fn with_location(mut self, location: RecordedLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
