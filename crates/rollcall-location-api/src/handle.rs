//! Watch subscription handle

use rollcall_api::{Fix, FixRequest};
use rollcall_util::WatchId;
use std::fmt;
use tokio::sync::mpsc;

use crate::LocationResult;

type StopFn = Box<dyn FnOnce() + Send>;

/// Handle to a continuous location subscription
///
/// Created by a location source when a watch starts. The source's teardown
/// runs exactly once: on the first [`WatchSubscription::stop`] call, or on
/// drop if the handle was never stopped explicitly.
pub struct WatchSubscription {
    id: WatchId,
    request: FixRequest,
    updates: mpsc::UnboundedReceiver<LocationResult<Fix>>,
    on_stop: Option<StopFn>,
}

impl WatchSubscription {
    pub fn new(
        id: WatchId,
        request: FixRequest,
        updates: mpsc::UnboundedReceiver<LocationResult<Fix>>,
        on_stop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            request,
            updates,
            on_stop: Some(Box::new(on_stop)),
        }
    }

    pub fn id(&self) -> WatchId {
        self.id
    }

    pub fn request(&self) -> &FixRequest {
        &self.request
    }

    /// Wait for the next update.
    ///
    /// Returns `None` once the subscription is stopped or the source closed it.
    pub async fn next(&mut self) -> Option<LocationResult<Fix>> {
        if self.on_stop.is_none() {
            return None;
        }
        self.updates.recv().await
    }

    /// Stop the subscription. Returns `true` if this call performed the teardown.
    pub fn stop(&mut self) -> bool {
        match self.on_stop.take() {
            Some(on_stop) => {
                self.updates.close();
                on_stop();
                tracing::debug!(watch_id = %self.id, "Watch subscription stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.on_stop.is_none()
    }
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
