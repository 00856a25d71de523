//! Once-per-session location permission prompt

use std::future::Future;
use tokio::sync::OnceCell;

use crate::{LocationError, LocationResult};

/// Answer to the platform permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// Runs the platform permission prompt at most once.
///
/// Concurrent requests (fast and accurate phases start together) wait on the
/// same prompt instead of opening a second one. The answer is remembered for
/// the lifetime of the latch.
#[derive(Debug, Default)]
pub struct PermissionLatch {
    state: OnceCell<PermissionState>,
}

impl PermissionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer from an earlier prompt, if any
    pub fn state(&self) -> Option<PermissionState> {
        self.state.get().copied()
    }

    /// Prompt if this is the first call, otherwise return the remembered answer
    pub async fn ensure<F, Fut>(&self, prompt: F) -> PermissionState
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PermissionState>,
    {
        *self.state.get_or_init(prompt).await
    }

    /// Like [`PermissionLatch::ensure`] but maps a denial to an error
    pub async fn require<F, Fut>(&self, prompt: F) -> LocationResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PermissionState>,
    {
        match self.ensure(prompt).await {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => Err(LocationError::PermissionDenied(
                "location access was not granted".into(),
            )),
        }
    }
}
