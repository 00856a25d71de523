//! Freshness cache for the best known fix

use rollcall_api::Fix;
use rollcall_util::MonotonicInstant;
use std::time::Duration;
use tracing::debug;

/// A fix together with when it entered the cache
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedFix {
    pub fix: Fix,
    pub cached_at: MonotonicInstant,
}

impl CachedFix {
    pub fn age(&self, now: MonotonicInstant) -> Duration {
        now.saturating_duration_since(self.cached_at)
    }
}

/// Holds the best known fix for a short validity window so that repeated
/// acquisitions can skip the single-fix phases.
#[derive(Debug)]
pub struct FreshnessCache {
    validity: Duration,
    entry: Option<CachedFix>,
}

impl FreshnessCache {
    pub fn new(validity: Duration) -> Self {
        Self {
            validity,
            entry: None,
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub fn set_validity(&mut self, validity: Duration) {
        self.validity = validity;
    }

    /// The cached fix, unless it is older than the validity window
    pub fn get(&self, now: MonotonicInstant) -> Option<CachedFix> {
        self.entry.filter(|entry| entry.age(now) <= self.validity)
    }

    pub fn put(&mut self, fix: Fix, now: MonotonicInstant) {
        self.entry = Some(CachedFix {
            fix,
            cached_at: now,
        });
    }

    /// Drop the entry. Returns whether there was one.
    pub fn invalidate(&mut self) -> bool {
        let had_entry = self.entry.take().is_some();
        if had_entry {
            debug!("Freshness cache invalidated");
        }
        had_entry
    }
}
