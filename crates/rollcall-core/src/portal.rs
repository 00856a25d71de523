//! Attendance portal: the surface exposed to the UI

use chrono::{DateTime, Local};
use rollcall_api::{
    AttendanceType, Fix, GateState, LocationStatus, RejectReason, SubmissionDecision,
};
use rollcall_config::Settings;
use rollcall_location_api::LocationSource;
use rollcall_store::{
    AttendanceRecord, AuditEvent, AuditEventType, RecordedLocation, Store, StoreError,
};
use rollcall_util::{AttendanceTypeId, MonotonicInstant, PersonId};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    AcquisitionOutcome, AttendanceNotification, FixAcquisition, FreshnessCache, LocationCell,
    Notifier, SubmissionRequest, decide,
};

struct RunningAcquisition {
    cancel: CancellationToken,
    task: JoinHandle<AcquisitionOutcome>,
}

/// Owns the published fix, the freshness cache, the single acquisition task
/// and the attendance gate.
///
/// Must be used from within a tokio runtime. Dropping the portal cancels
/// any running acquisition.
pub struct AttendancePortal {
    settings: RwLock<Settings>,
    source: Arc<dyn LocationSource>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    cell: Arc<LocationCell>,
    cache: Arc<Mutex<FreshnessCache>>,
    acquisition: Mutex<Option<RunningAcquisition>>,
    gate_state: Mutex<GateState>,
}

impl AttendancePortal {
    pub fn new(
        settings: Settings,
        source: Arc<dyn LocationSource>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!(
            source = source.name(),
            geofence_configured = settings.geofence.is_configured(),
            attendance_types = settings.attendance_types.len(),
            "Attendance portal initialized"
        );

        let _ = store.append_audit(AuditEvent::new(AuditEventType::SettingsLoaded {
            geofence_configured: settings.geofence.is_configured(),
            attendance_types: settings.attendance_types.len(),
        }));

        Self {
            cell: Arc::new(LocationCell::new(
                settings.geofence,
                settings.acquisition.hysteresis_m,
            )),
            cache: Arc::new(Mutex::new(FreshnessCache::new(settings.cache_validity))),
            settings: RwLock::new(settings),
            source,
            store,
            notifier,
            acquisition: Mutex::new(None),
            gate_state: Mutex::new(GateState::Idle),
        }
    }

    /// Begin acquisition, tearing down any earlier run first
    pub async fn start(&self) {
        self.cancel().await;

        let policy = self.settings.read().unwrap().acquisition.clone();
        let acquisition = FixAcquisition::new(
            self.source.clone(),
            policy,
            self.cell.clone(),
            self.cache.clone(),
        );

        let cancel = CancellationToken::new();
        let store = self.store.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = acquisition.run(token).await;
            if let AcquisitionOutcome::Exhausted(failure) = outcome {
                let _ = store.append_audit(AuditEvent::new(AuditEventType::AcquisitionFailed {
                    failure,
                }));
            }
            info!(?outcome, "Fix acquisition finished");
            outcome
        });

        *self.acquisition.lock().unwrap() = Some(RunningAcquisition { cancel, task });
    }

    /// Stop acquisition and release the watch and retry timers.
    ///
    /// Returns whether anything was running. Safe to call repeatedly.
    pub async fn cancel(&self) -> bool {
        let running = self.acquisition.lock().unwrap().take();
        let Some(running) = running else {
            return false;
        };

        running.cancel.cancel();
        match running.task.await {
            Ok(outcome) => debug!(?outcome, "Acquisition torn down"),
            Err(e) => warn!(error = %e, "Acquisition task failed"),
        }
        true
    }

    /// Whether an acquisition task is still running
    pub fn is_acquiring(&self) -> bool {
        self.acquisition
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Live location status as last published
    pub fn current_verdict(&self) -> LocationStatus {
        self.cell.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationStatus> {
        self.cell.subscribe()
    }

    pub fn current_fix(&self) -> Option<Fix> {
        self.cell.current_fix()
    }

    /// Gate state of the latest submission attempt
    pub fn gate_state(&self) -> GateState {
        *self.gate_state.lock().unwrap()
    }

    pub fn attendance_types(&self) -> Vec<AttendanceType> {
        self.settings.read().unwrap().attendance_types.clone()
    }

    /// Throw away the cached and published fix and acquire from scratch
    pub async fn refresh_location(&self) {
        // The old run must be gone before clearing, or a late watch reading
        // would repopulate the cache
        self.cancel().await;
        self.cache.lock().unwrap().invalidate();
        self.cell.reset();
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::LocationRefreshed));
        info!("Location refresh requested");

        self.start().await;
    }

    /// Swap in new settings and re-evaluate the published fix.
    ///
    /// Acquisition tuning applies from the next `start`.
    pub fn reload_settings(&self, settings: Settings) {
        self.cell.set_geofence(settings.geofence);
        self.cache
            .lock()
            .unwrap()
            .set_validity(settings.cache_validity);

        let geofence_configured = settings.geofence.is_configured();
        let attendance_types = settings.attendance_types.len();
        *self.settings.write().unwrap() = settings;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SettingsLoaded {
                geofence_configured,
                attendance_types,
            }));

        info!(geofence_configured, attendance_types, "Settings reloaded");
    }

    /// Evaluate a submission and record it if allowed
    pub async fn submit(
        &self,
        person_id: &PersonId,
        attendance_type: &AttendanceTypeId,
        reason: Option<&str>,
    ) -> SubmissionDecision {
        self.set_gate_state(GateState::Evaluating);

        let now = rollcall_util::now();
        let request = SubmissionRequest {
            person_id,
            attendance_type,
            reason,
            day: now.date_naive(),
        };

        let mut evidence = None;
        let decision = {
            let settings = self.settings.read().unwrap();
            let max_age = settings.cache_validity;
            decide(&request, &settings.attendance_types, self.store.as_ref(), || {
                let (status, fix) = self.cell.observe_at(MonotonicInstant::now(), max_age);
                evidence = fix;
                status
            })
        };

        let decision = if decision.allowed {
            self.record(&request, decision, evidence, now)
        } else {
            decision
        };

        match &decision.reason {
            None => info!(
                person_id = %person_id,
                attendance_type = %attendance_type,
                warned = decision.requires_warning_ack,
                "Submission accepted"
            ),
            Some(reason) => {
                info!(
                    person_id = %person_id,
                    attendance_type = %attendance_type,
                    %reason,
                    "Submission rejected"
                );
                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::SubmissionRejected {
                        person_id: person_id.clone(),
                        attendance_type: attendance_type.clone(),
                        reason: reason.clone(),
                    }));
            }
        }

        self.set_gate_state(decision.state());
        decision
    }

    fn record(
        &self,
        request: &SubmissionRequest<'_>,
        decision: SubmissionDecision,
        evidence: Option<Fix>,
        now: DateTime<Local>,
    ) -> SubmissionDecision {
        let mut record = AttendanceRecord::new(
            request.person_id.clone(),
            request.attendance_type.clone(),
            now,
        );
        if let (Some(fix), Some(verdict)) = (&evidence, &decision.verdict) {
            record = record.with_location(RecordedLocation::new(fix, verdict));
        }
        if let Some(reason) = request.trimmed_reason() {
            record = record.with_reason(reason);
        }

        match self.store.append(&record) {
            Ok(()) => {}
            Err(StoreError::Duplicate { day, .. }) => {
                return SubmissionDecision::rejected(
                    RejectReason::DuplicateSubmission {
                        attendance_type: request.attendance_type.clone(),
                        day,
                    },
                    decision.verdict,
                );
            }
            Err(e) => {
                warn!(error = %e, "Failed to store attendance record");
                return SubmissionDecision::rejected(
                    RejectReason::unknown("Could not save attendance; try again"),
                    decision.verdict,
                );
            }
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SubmissionAccepted {
                record_id: record.id.clone(),
                person_id: record.person_id.clone(),
                attendance_type: record.attendance_type.clone(),
                zone: decision.verdict.as_ref().map(|v| v.zone),
                warned: decision.requires_warning_ack,
            }));

        let notification = AttendanceNotification {
            person_id: record.person_id,
            attendance_type: record.attendance_type,
            timestamp: record.timestamp,
            distance_m: decision.verdict.as_ref().and_then(|v| v.distance_m),
            accuracy_m: decision.verdict.as_ref().map(|v| v.accuracy_m),
            reason: record.reason,
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(notification).await {
                warn!(error = %e, "Attendance notification failed");
            }
        });

        decision
    }

    fn set_gate_state(&self, state: GateState) {
        *self.gate_state.lock().unwrap() = state;
    }
}

impl Drop for AttendancePortal {
    fn drop(&mut self) {
        if let Ok(slot) = self.acquisition.get_mut()
            && let Some(running) = slot.take()
        {
            running.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EARTH_RADIUS_M, LogNotifier, NotifyError, NotifyResult};
    use async_trait::async_trait;
    use rollcall_api::{Coordinates, ReferenceGeofence, Zone};
    use rollcall_location_api::{MockLocationSource, MockResponse};
    use rollcall_store::SqliteStore;
    use std::time::Duration;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: AttendanceNotification) -> NotifyResult<()> {
            Err(NotifyError::Unavailable)
        }
    }

    fn north_of_origin(meters: f64) -> Coordinates {
        Coordinates::new((meters / EARTH_RADIUS_M).to_degrees(), 0.0)
    }

    fn settings() -> Settings {
        Settings {
            geofence: ReferenceGeofence::new(Coordinates::new(0.0, 0.0), 100.0),
            ..Settings::default()
        }
    }

    fn portal_with(
        source: Arc<MockLocationSource>,
        store: Arc<SqliteStore>,
        notifier: Arc<dyn Notifier>,
    ) -> AttendancePortal {
        AttendancePortal::new(settings(), source, store, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_check_in() {
        let source = Arc::new(MockLocationSource::new());
        source.push_accurate(MockResponse::fix(
            Duration::from_millis(100),
            Fix::new(north_of_origin(40.0), 10.0, MonotonicInstant::now()),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let portal = portal_with(source.clone(), store.clone(), Arc::new(LogNotifier));

        let mut status = portal.subscribe();
        portal.start().await;
        status.changed().await.unwrap();
        assert_eq!(status.borrow().verdict().unwrap().zone, Zone::Inside);

        let person = PersonId::new("ana");
        let decision = portal.submit(&person, &"check_in".into(), None).await;
        assert_eq!(decision.state(), GateState::Accepted);
        assert_eq!(portal.gate_state(), GateState::Accepted);

        let records = store
            .records_for_day(&person, rollcall_util::now().date_naive())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location.as_ref().unwrap().zone, Zone::Inside);

        let again = portal.submit(&person, &"check_in".into(), None).await;
        assert!(matches!(
            again.reason,
            Some(RejectReason::DuplicateSubmission { .. })
        ));

        assert!(portal.cancel().await);
        assert!(!portal.cancel().await);
        assert_eq!(source.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_submit_before_any_fix() {
        let source = Arc::new(MockLocationSource::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let portal = portal_with(source, store, Arc::new(LogNotifier));

        let decision = portal
            .submit(&PersonId::new("ana"), &"check_in".into(), None)
            .await;
        assert_eq!(decision.reason, Some(RejectReason::NoFixYet));
        assert_eq!(portal.gate_state(), GateState::Rejected);
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_block_acceptance() {
        let source = Arc::new(MockLocationSource::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let portal = portal_with(source, store.clone(), Arc::new(FailingNotifier));

        let person = PersonId::new("ana");
        let decision = portal
            .submit(&person, &"leave".into(), Some("family matter"))
            .await;
        assert!(decision.allowed);

        let records = store
            .records_for_day(&person, rollcall_util::now().date_naive())
            .unwrap();
        assert_eq!(records[0].reason.as_deref(), Some("family matter"));
        assert!(records[0].location.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_clears_fix_and_reacquires() {
        let source = Arc::new(MockLocationSource::new());
        source.push_accurate(MockResponse::fix(
            Duration::from_millis(100),
            Fix::new(north_of_origin(40.0), 10.0, MonotonicInstant::now()),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let portal = portal_with(source.clone(), store, Arc::new(LogNotifier));

        portal.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(portal.current_verdict().is_located());
        assert_eq!(source.watches_started(), 1);

        source.push_accurate(MockResponse::fix(
            Duration::from_millis(100),
            Fix::new(north_of_origin(60.0), 12.0, MonotonicInstant::now()),
        ));
        portal.refresh_location().await;

        // Old watch is gone and the published fix was cleared
        assert_eq!(source.watches_stopped(), 1);
        assert_eq!(portal.current_verdict(), LocationStatus::NoFix);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(portal.current_fix().unwrap().accuracy_m, 12.0);
        assert_eq!(source.accurate_requests(), 2);
        assert_eq!(source.active_watches(), 1);

        portal.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ignores_watch_reading_in_flight() {
        let source = Arc::new(MockLocationSource::new());
        source.push_accurate(MockResponse::fix(
            Duration::from_millis(100),
            Fix::new(north_of_origin(40.0), 10.0, MonotonicInstant::now()),
        ));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let portal = portal_with(source.clone(), store, Arc::new(LogNotifier));

        portal.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.watches_started(), 1);

        // Reading queued for the old run right before the refresh
        assert!(source.emit_watch(Ok(Fix::new(
            north_of_origin(45.0),
            6.0,
            MonotonicInstant::now()
        ))));
        source.push_accurate(MockResponse::fix(
            Duration::from_millis(100),
            Fix::new(north_of_origin(70.0), 9.0, MonotonicInstant::now()),
        ));
        portal.refresh_location().await;

        assert_eq!(portal.current_verdict(), LocationStatus::NoFix);
        assert!(portal.cache.lock().unwrap().get(MonotonicInstant::now()).is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.fast_requests(), 2);
        assert_eq!(source.accurate_requests(), 2);
        assert_eq!(portal.current_fix().unwrap().accuracy_m, 9.0);

        portal.cancel().await;
    }

    #[tokio::test]
    async fn test_reload_settings_reevaluates() {
        let source = Arc::new(MockLocationSource::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let portal = portal_with(source, store, Arc::new(LogNotifier));

        let now = MonotonicInstant::now();
        portal
            .cell
            .offer(Fix::new(north_of_origin(150.0), 10.0, now), now);
        assert_eq!(
            portal.current_verdict().verdict().unwrap().zone,
            Zone::Outside
        );

        portal.reload_settings(Settings {
            geofence: ReferenceGeofence::new(Coordinates::new(0.0, 0.0), 200.0),
            ..Settings::default()
        });
        assert_eq!(
            portal.current_verdict().verdict().unwrap().zone,
            Zone::Inside
        );
    }

    #[tokio::test]
    async fn test_drop_cancels_acquisition() {
        let source = Arc::new(MockLocationSource::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache_entry = Fix::new(north_of_origin(10.0), 5.0, MonotonicInstant::now());

        let portal = portal_with(source.clone(), store, Arc::new(LogNotifier));
        portal
            .cache
            .lock()
            .unwrap()
            .put(cache_entry, MonotonicInstant::now());
        portal.start().await;

        while source.watches_started() == 0 {
            tokio::task::yield_now().await;
        }
        drop(portal);

        while source.active_watches() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.watches_stopped(), 1);
    }
}
