//! Location source traits

use async_trait::async_trait;
use rollcall_api::{Fix, FixRequest, LocationFailure};
use std::time::Duration;
use thiserror::Error;

use crate::WatchSubscription;

/// Errors from location source operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Location service unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Location error: {0}")]
    Unknown(String),
}

impl LocationError {
    /// Coarse reason carried upward to the gate and the UI
    pub fn failure(&self) -> LocationFailure {
        match self {
            LocationError::PermissionDenied(_) => LocationFailure::PermissionDenied,
            LocationError::Unavailable(_) => LocationFailure::Unavailable,
            LocationError::Timeout(_) => LocationFailure::Timeout,
            LocationError::Unknown(_) => LocationFailure::Unknown,
        }
    }
}

pub type LocationResult<T> = Result<T, LocationError>;

/// Location source trait - implemented by platform-specific adapters
///
/// Implementations prompt for location permission at most once per
/// instance (see [`crate::PermissionLatch`]); callers never prompt.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Request one fix
    async fn request_single_fix(&self, request: FixRequest) -> LocationResult<Fix>;

    /// Start a continuous subscription
    async fn start_watch(&self, request: FixRequest) -> LocationResult<WatchSubscription>;

    /// Optional: check if the source is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}
