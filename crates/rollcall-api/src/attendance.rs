//! Attendance types, rejection reasons and submission decisions

use chrono::NaiveDate;
use rollcall_util::AttendanceTypeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LocationFailure, ZoneVerdict};

/// An attendance type as configured by the administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceType {
    pub id: AttendanceTypeId,
    pub label: String,

    /// Presence types are geofenced; declaration types (leave, sick)
    /// skip the geofence and need a reason instead.
    pub presence: bool,
}

impl AttendanceType {
    pub fn presence(id: impl Into<AttendanceTypeId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            presence: true,
        }
    }

    pub fn declaration(id: impl Into<AttendanceTypeId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            presence: false,
        }
    }

    pub fn requires_reason(&self) -> bool {
        !self.presence
    }
}

/// Built-in attendance types used when settings define none
pub fn default_attendance_types() -> Vec<AttendanceType> {
    vec![
        AttendanceType::presence("check_in", "Check in"),
        AttendanceType::presence("check_out", "Check out"),
        AttendanceType::declaration("leave", "Leave"),
        AttendanceType::declaration("sick", "Sick"),
    ]
}

/// Why a submission was rejected.
///
/// Each variant stays distinct so the UI can tell the user what to do next.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("Location permission was denied; allow location access and try again")]
    PermissionDenied,

    #[error("Location service is unavailable; enable location and try again")]
    ServiceUnavailable,

    #[error("Timed out waiting for a location fix; try again")]
    Timeout,

    #[error("No location fix yet; wait for your position or refresh")]
    NoFixYet,

    #[error("The attendance location is not configured; contact an administrator")]
    Unconfigured,

    #[error(
        "Outside the attendance area: {distance_m:.0} m from the center (radius {radius_m:.0} m, accuracy ±{accuracy_m:.0} m)"
    )]
    OutsideRadius {
        distance_m: f64,
        accuracy_m: f64,
        radius_m: f64,
    },

    #[error("{attendance_type} was already submitted on {day}")]
    DuplicateSubmission {
        attendance_type: AttendanceTypeId,
        day: NaiveDate,
    },

    #[error("A reason is required for {attendance_type}")]
    MissingReason { attendance_type: AttendanceTypeId },

    #[error("{detail}")]
    Unknown { detail: String },
}

impl RejectReason {
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::Unknown {
            detail: detail.into(),
        }
    }

    /// Whether retrying the same submission (after waiting, moving or
    /// re-acquiring) can succeed without changing what is submitted.
    pub fn is_retryable(&self) -> bool {
        match self {
            RejectReason::PermissionDenied
            | RejectReason::ServiceUnavailable
            | RejectReason::Timeout
            | RejectReason::NoFixYet
            | RejectReason::Unconfigured
            | RejectReason::OutsideRadius { .. }
            | RejectReason::Unknown { .. } => true,
            RejectReason::DuplicateSubmission { .. } | RejectReason::MissingReason { .. } => false,
        }
    }

    /// Whether this rejection needs an administrator rather than the user
    pub fn needs_administrator(&self) -> bool {
        matches!(self, RejectReason::Unconfigured)
    }
}

impl From<LocationFailure> for RejectReason {
    fn from(failure: LocationFailure) -> Self {
        match failure {
            LocationFailure::PermissionDenied => RejectReason::PermissionDenied,
            LocationFailure::Unavailable => RejectReason::ServiceUnavailable,
            LocationFailure::Timeout => RejectReason::Timeout,
            LocationFailure::Unknown => RejectReason::unknown("Location request failed"),
        }
    }
}

/// States of the attendance gate for one submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Evaluating,
    Accepted,
    WarnedAccepted,
    Rejected,
}

/// Decision for one submission attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDecision {
    pub allowed: bool,

    /// Submission proceeds, but the caller must show a non-blocking warning
    pub requires_warning_ack: bool,

    /// Set when the submission was rejected
    pub reason: Option<RejectReason>,

    /// Verdict the decision was based on, if the geofence was consulted
    pub verdict: Option<ZoneVerdict>,
}

impl SubmissionDecision {
    pub fn accepted(verdict: Option<ZoneVerdict>) -> Self {
        Self {
            allowed: true,
            requires_warning_ack: false,
            reason: None,
            verdict,
        }
    }

    pub fn warned(verdict: ZoneVerdict) -> Self {
        Self {
            allowed: true,
            requires_warning_ack: true,
            reason: None,
            verdict: Some(verdict),
        }
    }

    pub fn rejected(reason: RejectReason, verdict: Option<ZoneVerdict>) -> Self {
        Self {
            allowed: false,
            requires_warning_ack: false,
            reason: Some(reason),
            verdict,
        }
    }

    /// Terminal gate state this decision corresponds to
    pub fn state(&self) -> GateState {
        match (self.allowed, self.requires_warning_ack) {
            (true, false) => GateState::Accepted,
            (true, true) => GateState::WarnedAccepted,
            (false, _) => GateState::Rejected,
        }
    }

    /// Text for the UI: the rejection, the warning, or a plain confirmation
    pub fn message(&self) -> String {
        if let Some(reason) = &self.reason {
            return reason.to_string();
        }
        match &self.verdict {
            Some(verdict) if self.requires_warning_ack => verdict.message.clone(),
            _ => "Attendance recorded".to_string(),
        }
    }
}
