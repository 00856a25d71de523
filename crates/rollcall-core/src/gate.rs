//! Attendance gate

use chrono::NaiveDate;
use rollcall_api::{
    AttendanceType, LocationStatus, RejectReason, SubmissionDecision, Zone, ZoneVerdict,
};
use rollcall_store::Store;
use rollcall_util::{AttendanceTypeId, PersonId};
use tracing::{debug, warn};

/// One submission attempt as seen by the gate
#[derive(Debug, Clone, Copy)]
pub struct SubmissionRequest<'a> {
    pub person_id: &'a PersonId,
    pub attendance_type: &'a AttendanceTypeId,
    pub reason: Option<&'a str>,

    /// Local calendar day the submission counts for
    pub day: NaiveDate,
}

impl SubmissionRequest<'_> {
    /// The reason with surrounding whitespace removed, if anything is left
    pub fn trimmed_reason(&self) -> Option<&str> {
        self.reason.map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Decide whether a submission may be recorded.
///
/// Checks run in order: known type, same-day duplicate, then either the
/// reason (declaration types) or the zone verdict (presence types).
/// `locate` is only called for presence types.
pub fn decide(
    request: &SubmissionRequest<'_>,
    types: &[AttendanceType],
    store: &dyn Store,
    locate: impl FnOnce() -> LocationStatus,
) -> SubmissionDecision {
    let Some(kind) = types.iter().find(|t| &t.id == request.attendance_type) else {
        return SubmissionDecision::rejected(
            RejectReason::unknown(format!(
                "Unknown attendance type: {}",
                request.attendance_type
            )),
            None,
        );
    };

    match store.exists(request.person_id, request.day, request.attendance_type) {
        Ok(true) => {
            return SubmissionDecision::rejected(
                RejectReason::DuplicateSubmission {
                    attendance_type: kind.id.clone(),
                    day: request.day,
                },
                None,
            );
        }
        Ok(false) => {}
        Err(e) => {
            warn!(error = %e, "Failed to check for an earlier submission");
            return SubmissionDecision::rejected(
                RejectReason::unknown("Could not check earlier submissions; try again"),
                None,
            );
        }
    }

    if kind.requires_reason() {
        return match request.trimmed_reason() {
            Some(_) => SubmissionDecision::accepted(None),
            None => SubmissionDecision::rejected(
                RejectReason::MissingReason {
                    attendance_type: kind.id.clone(),
                },
                None,
            ),
        };
    }

    let status = locate();
    debug!(?status, attendance_type = %kind.id, "Evaluating presence submission");

    match status {
        LocationStatus::NoFix => SubmissionDecision::rejected(RejectReason::NoFixYet, None),
        LocationStatus::Unavailable { failure } => {
            SubmissionDecision::rejected(failure.into(), None)
        }
        LocationStatus::Located { verdict } => decide_zone(verdict),
    }
}

fn decide_zone(verdict: ZoneVerdict) -> SubmissionDecision {
    match verdict.zone {
        Zone::Inside => SubmissionDecision::accepted(Some(verdict)),
        Zone::NearBoundary => SubmissionDecision::warned(verdict),
        Zone::Outside => SubmissionDecision::rejected(
            RejectReason::OutsideRadius {
                distance_m: verdict.distance_m.unwrap_or_default(),
                accuracy_m: verdict.accuracy_m,
                radius_m: verdict.radius_m,
            },
            Some(verdict),
        ),
        Zone::Unconfigured => {
            SubmissionDecision::rejected(RejectReason::Unconfigured, Some(verdict))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EARTH_RADIUS_M, evaluate};
    use chrono::{Local, TimeZone};
    use rollcall_api::{
        Coordinates, Fix, GateState, LocationFailure, ReferenceGeofence, default_attendance_types,
    };
    use rollcall_store::{AttendanceRecord, SqliteStore};
    use rollcall_util::MonotonicInstant;
    use std::cell::Cell;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn located(meters_north: f64, accuracy_m: f64) -> LocationStatus {
        let fix = Fix::new(
            Coordinates::new((meters_north / EARTH_RADIUS_M).to_degrees(), 0.0),
            accuracy_m,
            MonotonicInstant::now(),
        );
        let fence = ReferenceGeofence::new(Coordinates::new(0.0, 0.0), 100.0);
        LocationStatus::Located {
            verdict: evaluate(&fix, &fence),
        }
    }

    fn submit(
        store: &SqliteStore,
        kind: &str,
        reason: Option<&str>,
        status: LocationStatus,
    ) -> SubmissionDecision {
        let person = PersonId::new("ana");
        let kind = AttendanceTypeId::new(kind);
        let request = SubmissionRequest {
            person_id: &person,
            attendance_type: &kind,
            reason,
            day: day(),
        };
        decide(&request, &default_attendance_types(), store, || status)
    }

    fn record(store: &SqliteStore, kind: &str) {
        let at = Local.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap();
        store
            .append(&AttendanceRecord::new("ana".into(), kind.into(), at))
            .unwrap();
    }

    #[test]
    fn test_scenario_e_missing_reason_skips_geofence() {
        let store = SqliteStore::in_memory().unwrap();
        let person = PersonId::new("ana");
        let kind = AttendanceTypeId::new("leave");
        let located_called = Cell::new(false);

        for reason in [Some(""), Some("   "), None] {
            let request = SubmissionRequest {
                person_id: &person,
                attendance_type: &kind,
                reason,
                day: day(),
            };
            let decision = decide(&request, &default_attendance_types(), &store, || {
                located_called.set(true);
                LocationStatus::NoFix
            });

            assert_eq!(decision.state(), GateState::Rejected);
            assert!(matches!(decision.reason, Some(RejectReason::MissingReason { .. })));
        }

        assert!(!located_called.get());
    }

    #[test]
    fn test_declaration_with_reason_accepted_without_location() {
        let store = SqliteStore::in_memory().unwrap();
        let decision = submit(&store, "sick", Some(" fever "), LocationStatus::NoFix);

        assert_eq!(decision.state(), GateState::Accepted);
        assert!(decision.verdict.is_none());
    }

    #[test]
    fn test_presence_zones() {
        let store = SqliteStore::in_memory().unwrap();

        let inside = submit(&store, "check_in", None, located(100.0, 20.0));
        assert_eq!(inside.state(), GateState::Accepted);

        let near = submit(&store, "check_in", None, located(180.0, 60.0));
        assert_eq!(near.state(), GateState::WarnedAccepted);
        assert!(near.requires_warning_ack);

        let outside = submit(&store, "check_in", None, located(200.0, 20.0));
        match outside.reason {
            Some(RejectReason::OutsideRadius {
                distance_m,
                accuracy_m,
                radius_m,
            }) => {
                assert!((distance_m - 200.0).abs() < 1e-6);
                assert_eq!(accuracy_m, 20.0);
                assert_eq!(radius_m, 100.0);
            }
            other => panic!("expected OutsideRadius, got {other:?}"),
        }
        assert!(outside.verdict.is_some());
    }

    #[test]
    fn test_no_fix_and_failures_stay_distinct() {
        let store = SqliteStore::in_memory().unwrap();

        let no_fix = submit(&store, "check_in", None, LocationStatus::NoFix);
        assert_eq!(no_fix.reason, Some(RejectReason::NoFixYet));

        let denied = submit(
            &store,
            "check_in",
            None,
            LocationStatus::Unavailable {
                failure: LocationFailure::PermissionDenied,
            },
        );
        assert_eq!(denied.reason, Some(RejectReason::PermissionDenied));

        let unavailable = submit(
            &store,
            "check_out",
            None,
            LocationStatus::Unavailable {
                failure: LocationFailure::Unavailable,
            },
        );
        assert_eq!(unavailable.reason, Some(RejectReason::ServiceUnavailable));
    }

    #[test]
    fn test_unconfigured_geofence_rejects() {
        let store = SqliteStore::in_memory().unwrap();
        let fix = Fix::new(Coordinates::new(0.0, 0.0), 5.0, MonotonicInstant::now());
        let status = LocationStatus::Located {
            verdict: evaluate(&fix, &ReferenceGeofence::unconfigured()),
        };

        let decision = submit(&store, "check_in", None, status);
        assert_eq!(decision.reason, Some(RejectReason::Unconfigured));
        assert!(decision.reason.unwrap().needs_administrator());
    }

    #[test]
    fn test_duplicate_wins_over_outside_radius() {
        let store = SqliteStore::in_memory().unwrap();
        record(&store, "check_in");

        let decision = submit(&store, "check_in", None, located(5_000.0, 10.0));
        assert_eq!(
            decision.reason,
            Some(RejectReason::DuplicateSubmission {
                attendance_type: "check_in".into(),
                day: day(),
            })
        );
    }

    #[test]
    fn test_duplicate_wins_over_missing_reason() {
        let store = SqliteStore::in_memory().unwrap();
        record(&store, "leave");

        let decision = submit(&store, "leave", None, LocationStatus::NoFix);
        assert!(matches!(
            decision.reason,
            Some(RejectReason::DuplicateSubmission { .. })
        ));
    }

    #[test]
    fn test_other_type_same_day_is_not_duplicate() {
        let store = SqliteStore::in_memory().unwrap();
        record(&store, "check_in");

        let decision = submit(&store, "check_out", None, located(10.0, 10.0));
        assert_eq!(decision.state(), GateState::Accepted);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let decision = submit(&store, "holiday", Some("beach"), LocationStatus::NoFix);

        match decision.reason {
            Some(RejectReason::Unknown { detail }) => assert!(detail.contains("holiday")),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}
