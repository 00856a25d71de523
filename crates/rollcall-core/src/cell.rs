//! Published-fix cell

use rollcall_api::{Fix, LocationFailure, LocationStatus, ReferenceGeofence};
use rollcall_util::MonotonicInstant;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::{evaluate, haversine_m};

/// What the cell did with an offered fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The fix replaced the published one
    Published,

    /// The fix agrees with the published one; only its freshness was renewed
    Confirmed,

    /// The fix was discarded
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct Published {
    fix: Fix,

    /// Last time a fix was published or confirmed
    last_seen: MonotonicInstant,
}

#[derive(Debug)]
struct CellState {
    geofence: ReferenceGeofence,
    published: Option<Published>,
    failure: Option<LocationFailure>,
}

impl CellState {
    fn status(&self) -> LocationStatus {
        match (&self.published, self.failure) {
            (Some(published), _) => LocationStatus::Located {
                verdict: evaluate(&published.fix, &self.geofence),
            },
            (None, Some(failure)) => LocationStatus::Unavailable { failure },
            (None, None) => LocationStatus::NoFix,
        }
    }
}

/// Single slot holding the published fix.
///
/// Every writer (fast phase, accurate phase, watch, cache) goes through
/// [`LocationCell::offer`], so concurrent writers are serialized by arrival
/// order under one rule:
///
/// - a fix with better accuracy always replaces the published one;
/// - otherwise it replaces it only if it moved more than the hysteresis
///   distance and was not captured before the published fix.
///
/// Every change to the derived [`LocationStatus`] is broadcast to
/// subscribers.
#[derive(Debug)]
pub struct LocationCell {
    hysteresis_m: f64,
    state: Mutex<CellState>,
    status_tx: watch::Sender<LocationStatus>,
}

impl LocationCell {
    pub fn new(geofence: ReferenceGeofence, hysteresis_m: f64) -> Self {
        let (status_tx, _) = watch::channel(LocationStatus::NoFix);
        Self {
            hysteresis_m,
            state: Mutex::new(CellState {
                geofence,
                published: None,
                failure: None,
            }),
            status_tx,
        }
    }

    /// Offer a new fix to the cell
    pub fn offer(&self, fix: Fix, now: MonotonicInstant) -> Offer {
        let mut state = self.state.lock().unwrap();

        let offer = match &mut state.published {
            None => Offer::Published,
            Some(current) => {
                let moved_m = haversine_m(current.fix.coordinates, fix.coordinates);
                let not_older = fix.captured_at >= current.fix.captured_at;

                if fix.accuracy_m < current.fix.accuracy_m {
                    Offer::Published
                } else if moved_m > self.hysteresis_m && not_older {
                    Offer::Published
                } else if moved_m <= self.hysteresis_m && not_older {
                    current.last_seen = current.last_seen.max(now);
                    Offer::Confirmed
                } else {
                    Offer::Ignored
                }
            }
        };

        if offer == Offer::Published {
            state.published = Some(Published {
                fix,
                last_seen: now,
            });
            state.failure = None;
            self.status_tx.send_replace(state.status());
        }

        debug!(
            accuracy_m = fix.accuracy_m,
            latitude = fix.latitude(),
            longitude = fix.longitude(),
            ?offer,
            "Fix offered to cell"
        );

        offer
    }

    /// Record that acquisition ended without a fix.
    ///
    /// Has no effect while a fix is published. Returns whether the status
    /// changed to `Unavailable`.
    pub fn fail(&self, failure: LocationFailure) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.published.is_some() {
            return false;
        }

        state.failure = Some(failure);
        self.status_tx.send_replace(state.status());
        true
    }

    /// Forget the published fix and any failure
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.published = None;
        state.failure = None;
        self.status_tx.send_replace(LocationStatus::NoFix);
    }

    /// Swap the reference geofence and re-evaluate the published fix
    pub fn set_geofence(&self, geofence: ReferenceGeofence) {
        let mut state = self.state.lock().unwrap();
        state.geofence = geofence;
        self.status_tx.send_replace(state.status());
    }

    pub fn current_fix(&self) -> Option<Fix> {
        self.state.lock().unwrap().published.map(|p| p.fix)
    }

    /// Current status as last broadcast
    pub fn status(&self) -> LocationStatus {
        self.status_tx.borrow().clone()
    }

    /// Status and fix as seen at `now`, treating a fix not confirmed within
    /// `max_age` as no fix.
    pub fn observe_at(
        &self,
        now: MonotonicInstant,
        max_age: Duration,
    ) -> (LocationStatus, Option<Fix>) {
        let state = self.state.lock().unwrap();
        match &state.published {
            Some(published) if now.saturating_duration_since(published.last_seen) > max_age => {
                debug!(
                    age_ms = now.saturating_duration_since(published.last_seen).as_millis() as u64,
                    "Published fix is stale"
                );
                (LocationStatus::NoFix, None)
            }
            Some(published) => (state.status(), Some(published.fix)),
            None => (state.status(), None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationStatus> {
        self.status_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EARTH_RADIUS_M;
    use rollcall_api::{Coordinates, Zone};

    fn north_of_origin(meters: f64) -> Coordinates {
        Coordinates::new((meters / EARTH_RADIUS_M).to_degrees(), 0.0)
    }

    fn fence() -> ReferenceGeofence {
        ReferenceGeofence::new(Coordinates::new(0.0, 0.0), 100.0)
    }

    #[test]
    fn test_first_fix_is_published() {
        let cell = LocationCell::new(fence(), 5.0);
        let now = MonotonicInstant::now();
        assert_eq!(cell.status(), LocationStatus::NoFix);

        let fix = Fix::new(north_of_origin(20.0), 10.0, now);
        assert_eq!(cell.offer(fix, now), Offer::Published);
        assert_eq!(cell.current_fix(), Some(fix));
        assert_eq!(cell.status().verdict().unwrap().zone, Zone::Inside);
    }

    #[test]
    fn test_accuracy_monotonic_in_either_order() {
        let now = MonotonicInstant::now();
        let coarse = Fix::new(north_of_origin(20.0), 50.0, now);
        let fine = Fix::new(north_of_origin(23.0), 10.0, now);

        let cell = LocationCell::new(fence(), 5.0);
        cell.offer(coarse, now);
        cell.offer(fine, now);
        assert_eq!(cell.current_fix(), Some(fine));

        let cell = LocationCell::new(fence(), 5.0);
        cell.offer(fine, now);
        assert_eq!(cell.offer(coarse, now), Offer::Confirmed);
        assert_eq!(cell.current_fix(), Some(fine));
    }

    #[test]
    fn test_movement_beyond_hysteresis_replaces() {
        let start = MonotonicInstant::now();
        let cell = LocationCell::new(fence(), 5.0);
        cell.offer(Fix::new(north_of_origin(20.0), 10.0, start), start);

        let later = start + Duration::from_secs(1);
        let moved = Fix::new(north_of_origin(40.0), 12.0, later);
        assert_eq!(cell.offer(moved, later), Offer::Published);
        assert_eq!(cell.current_fix(), Some(moved));
    }

    #[test]
    fn test_late_older_fix_is_discarded() {
        let start = MonotonicInstant::now();
        let later = start + Duration::from_secs(5);
        let cell = LocationCell::new(fence(), 5.0);

        let watch_fix = Fix::new(north_of_origin(20.0), 8.0, later);
        cell.offer(watch_fix, later);

        // Captured earlier, far away and less accurate
        let late_fast = Fix::new(north_of_origin(300.0), 80.0, start);
        assert_eq!(cell.offer(late_fast, later), Offer::Ignored);
        assert_eq!(cell.current_fix(), Some(watch_fix));
    }

    #[test]
    fn test_fail_never_regresses_over_a_fix() {
        let cell = LocationCell::new(fence(), 5.0);
        assert!(cell.fail(LocationFailure::Timeout));
        assert_eq!(
            cell.status(),
            LocationStatus::Unavailable {
                failure: LocationFailure::Timeout
            }
        );

        let now = MonotonicInstant::now();
        cell.offer(Fix::new(north_of_origin(20.0), 10.0, now), now);
        assert!(!cell.fail(LocationFailure::Unavailable));
        assert!(cell.status().is_located());
    }

    #[test]
    fn test_stale_fix_observed_as_no_fix() {
        let start = MonotonicInstant::now();
        let cell = LocationCell::new(fence(), 5.0);
        cell.offer(Fix::new(north_of_origin(20.0), 10.0, start), start);

        let window = Duration::from_secs(30);
        let (status, fix) = cell.observe_at(start + Duration::from_secs(30), window);
        assert!(status.is_located());
        assert!(fix.is_some());

        let (status, fix) = cell.observe_at(start + Duration::from_millis(30_001), window);
        assert_eq!(status, LocationStatus::NoFix);
        assert!(fix.is_none());
    }

    #[test]
    fn test_confirmation_renews_freshness() {
        let start = MonotonicInstant::now();
        let cell = LocationCell::new(fence(), 5.0);
        cell.offer(Fix::new(north_of_origin(20.0), 10.0, start), start);

        let later = start + Duration::from_secs(25);
        let same_place = Fix::new(north_of_origin(22.0), 10.0, later);
        assert_eq!(cell.offer(same_place, later), Offer::Confirmed);

        let (status, _) = cell.observe_at(start + Duration::from_secs(50), Duration::from_secs(30));
        assert!(status.is_located());
    }

    #[test]
    fn test_confirmation_never_rolls_freshness_back() {
        let start = MonotonicInstant::now();
        let later = start + Duration::from_secs(20);
        let cell = LocationCell::new(fence(), 5.0);
        let fix = Fix::new(north_of_origin(20.0), 10.0, start);
        cell.offer(fix, later);

        // Re-offered with the instant it was first seen
        assert_eq!(cell.offer(fix, start), Offer::Confirmed);

        let (status, _) = cell.observe_at(start + Duration::from_secs(45), Duration::from_secs(30));
        assert!(status.is_located());
    }

    #[tokio::test]
    async fn test_subscribers_see_geofence_changes() {
        let cell = LocationCell::new(ReferenceGeofence::unconfigured(), 5.0);
        let mut rx = cell.subscribe();
        let now = MonotonicInstant::now();

        cell.offer(Fix::new(north_of_origin(20.0), 10.0, now), now);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().verdict().unwrap().zone, Zone::Unconfigured);

        cell.set_geofence(fence());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().verdict().unwrap().zone, Zone::Inside);

        cell.reset();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LocationStatus::NoFix);
    }
}
