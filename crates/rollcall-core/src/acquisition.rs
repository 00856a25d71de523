//! Fix acquisition strategy

use rollcall_api::{Fix, FixRequest, LocationFailure};
use rollcall_config::AcquisitionPolicy;
use rollcall_location_api::LocationSource;
use rollcall_util::MonotonicInstant;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{FreshnessCache, LocationCell, Offer};

/// Phase a fix request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPhase {
    Fast,
    Accurate,
    Watch,
}

impl fmt::Display for AcquisitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcquisitionPhase::Fast => "fast",
            AcquisitionPhase::Accurate => "accurate",
            AcquisitionPhase::Watch => "watch",
        };
        f.write_str(s)
    }
}

/// How an acquisition run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    /// Both single-fix phases failed and nothing was published
    Exhausted(LocationFailure),

    /// The watch could not be started; the published fix is kept
    WatchFailed(LocationFailure),

    /// The source closed the watch
    WatchEnded,

    /// The run was cancelled
    Cancelled,
}

/// One acquisition run: fast and accurate single fixes in parallel, then a
/// continuous watch. All fixes are offered to the shared [`LocationCell`].
pub struct FixAcquisition {
    source: Arc<dyn LocationSource>,
    policy: AcquisitionPolicy,
    cell: Arc<LocationCell>,
    cache: Arc<Mutex<FreshnessCache>>,
}

impl FixAcquisition {
    pub fn new(
        source: Arc<dyn LocationSource>,
        policy: AcquisitionPolicy,
        cell: Arc<LocationCell>,
        cache: Arc<Mutex<FreshnessCache>>,
    ) -> Self {
        Self {
            source,
            policy,
            cell,
            cache,
        }
    }

    /// Run until the watch ends or `cancel` fires.
    ///
    /// Dropping the in-flight work on cancellation stops the watch and any
    /// pending retry timer.
    pub async fn run(self, cancel: CancellationToken) -> AcquisitionOutcome {
        info!(source = self.source.name(), "Starting fix acquisition");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Fix acquisition cancelled");
                AcquisitionOutcome::Cancelled
            }
            outcome = self.acquire(&cancel) => outcome,
        }
    }

    async fn acquire(&self, cancel: &CancellationToken) -> AcquisitionOutcome {
        let fast = self.single_fix(AcquisitionPhase::Fast, self.policy.fast);
        tokio::pin!(fast);
        let mut fast_done = false;
        let mut last_failure = None;

        let cached = self.cache.lock().unwrap().get(MonotonicInstant::now());
        if let Some(cached) = cached {
            info!(
                age_ms = cached.age(MonotonicInstant::now()).as_millis() as u64,
                accuracy_m = cached.fix.accuracy_m,
                "Using cached fix; skipping single-fix phases"
            );
            // Publish as seen at caching time; the cache is not restamped
            self.cell.offer(cached.fix, cached.cached_at);
            fast_done = true;
        } else {
            let accurate = self.accurate_phase(cancel);
            tokio::pin!(accurate);

            loop {
                tokio::select! {
                    result = &mut fast, if !fast_done => {
                        fast_done = true;
                        self.settle(AcquisitionPhase::Fast, result, &mut last_failure);
                    }
                    result = &mut accurate => {
                        self.settle(AcquisitionPhase::Accurate, result, &mut last_failure);
                        break;
                    }
                }
            }

            // The fast answer may still turn an exhausted run into a usable one
            if !fast_done && self.cell.current_fix().is_none() {
                let result = (&mut fast).await;
                fast_done = true;
                self.settle(AcquisitionPhase::Fast, result, &mut last_failure);
            }

            if self.cell.current_fix().is_none() {
                let failure = last_failure.unwrap_or(LocationFailure::Unknown);
                self.cell.fail(failure);
                warn!(%failure, "No fix after fast and accurate phases; giving up until refresh");
                return AcquisitionOutcome::Exhausted(failure);
            }
        }

        let request = self.policy.watch;
        let started = tokio::time::timeout(request.timeout, self.source.start_watch(request)).await;
        let mut watch = match started {
            Ok(Ok(watch)) => watch,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to start watch; keeping published fix");
                return AcquisitionOutcome::WatchFailed(e.failure());
            }
            Err(_) => {
                warn!(
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Timed out starting watch; keeping published fix"
                );
                return AcquisitionOutcome::WatchFailed(LocationFailure::Timeout);
            }
        };
        info!(watch_id = %watch.id(), "Watch started");

        loop {
            tokio::select! {
                result = &mut fast, if !fast_done => {
                    fast_done = true;
                    self.settle(AcquisitionPhase::Fast, result, &mut last_failure);
                }
                update = tokio::time::timeout(request.timeout, watch.next()) => {
                    match update {
                        Ok(Some(Ok(fix))) => self.accept(AcquisitionPhase::Watch, fix),
                        Ok(Some(Err(e))) => {
                            warn!(error = %e, "Watch reported an error; keeping published fix");
                        }
                        Ok(None) => {
                            info!(watch_id = %watch.id(), "Watch closed by source");
                            return AcquisitionOutcome::WatchEnded;
                        }
                        Err(_) => {
                            warn!(
                                timeout_ms = request.timeout.as_millis() as u64,
                                "No watch update within timeout; keeping watch open"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Accurate single fix with retries.
    ///
    /// Stops early on a permission denial, which retrying cannot fix.
    async fn accurate_phase(&self, cancel: &CancellationToken) -> Result<Fix, LocationFailure> {
        let attempts = self.policy.accurate_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match self
                .single_fix(AcquisitionPhase::Accurate, self.policy.accurate)
                .await
            {
                Ok(fix) => return Ok(fix),
                Err(failure) => failure,
            };

            if attempt >= attempts || failure == LocationFailure::PermissionDenied {
                warn!(attempt, %failure, "Accurate phase exhausted");
                return Err(failure);
            }

            debug!(
                attempt,
                backoff_ms = self.policy.retry_backoff.as_millis() as u64,
                "Retrying accurate fix"
            );
            tokio::time::sleep(self.policy.retry_backoff).await;

            if cancel.is_cancelled() {
                return Err(failure);
            }
        }
    }

    async fn single_fix(
        &self,
        phase: AcquisitionPhase,
        request: FixRequest,
    ) -> Result<Fix, LocationFailure> {
        debug!(
            %phase,
            high_accuracy = request.high_accuracy,
            timeout_ms = request.timeout.as_millis() as u64,
            max_age_ms = request.max_age.as_millis() as u64,
            "Requesting single fix"
        );

        match tokio::time::timeout(request.timeout, self.source.request_single_fix(request)).await
        {
            Ok(Ok(fix)) => Ok(fix),
            Ok(Err(e)) => {
                warn!(%phase, error = %e, "Fix request failed");
                Err(e.failure())
            }
            Err(_) => {
                warn!(
                    %phase,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Fix request timed out"
                );
                Err(LocationFailure::Timeout)
            }
        }
    }

    fn settle(
        &self,
        phase: AcquisitionPhase,
        result: Result<Fix, LocationFailure>,
        last_failure: &mut Option<LocationFailure>,
    ) {
        match result {
            Ok(fix) => self.accept(phase, fix),
            Err(failure) => *last_failure = Some(failure),
        }
    }

    fn accept(&self, phase: AcquisitionPhase, fix: Fix) {
        let now = MonotonicInstant::now();
        let offer = self.cell.offer(fix, now);

        if offer != Offer::Ignored
            && let Some(current) = self.cell.current_fix()
        {
            self.cache.lock().unwrap().put(current, now);
        }

        if offer == Offer::Published {
            info!(
                %phase,
                accuracy_m = fix.accuracy_m,
                "Published new fix"
            );
        }
    }
}
