//! Mock location source for testing

use async_trait::async_trait;
use rollcall_api::{Fix, FixRequest};
use rollcall_util::WatchId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    LocationError, LocationResult, LocationSource, PermissionLatch, PermissionState,
    WatchSubscription,
};

/// A scripted response: wait `delay`, then answer with `result`
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub delay: Duration,
    pub result: LocationResult<Fix>,
}

impl MockResponse {
    pub fn fix(delay: Duration, fix: Fix) -> Self {
        Self {
            delay,
            result: Ok(fix),
        }
    }

    pub fn error(delay: Duration, error: LocationError) -> Self {
        Self {
            delay,
            result: Err(error),
        }
    }
}

type WatchSlot = Arc<Mutex<Option<(WatchId, mpsc::UnboundedSender<LocationResult<Fix>>)>>>;

/// Mock location source for unit/integration testing
///
/// Single-fix requests are answered from per-accuracy queues. An empty queue
/// behaves like a platform that never answers: the request times out after
/// its own timeout.
pub struct MockLocationSource {
    permission: PermissionLatch,
    prompts: AtomicU32,

    fast_requests: AtomicU32,
    accurate_requests: AtomicU32,
    watches_started: AtomicU32,
    watches_stopped: Arc<AtomicU32>,
    last_watch_request: Mutex<Option<FixRequest>>,

    active_watch: WatchSlot,

    /// Answer given to the (single) permission prompt
    pub grant: Mutex<PermissionState>,

    /// Responses for `high_accuracy = false` requests
    pub fast_responses: Mutex<VecDeque<MockResponse>>,

    /// Responses for `high_accuracy = true` requests
    pub accurate_responses: Mutex<VecDeque<MockResponse>>,

    /// Items delivered to the next watch, in order, each after its delay
    pub watch_script: Mutex<Vec<MockResponse>>,

    /// Make the next `start_watch` fail
    pub fail_watch: Mutex<Option<LocationError>>,
}

impl MockLocationSource {
    pub fn new() -> Self {
        Self {
            permission: PermissionLatch::new(),
            prompts: AtomicU32::new(0),
            fast_requests: AtomicU32::new(0),
            accurate_requests: AtomicU32::new(0),
            watches_started: AtomicU32::new(0),
            watches_stopped: Arc::new(AtomicU32::new(0)),
            last_watch_request: Mutex::new(None),
            active_watch: Arc::new(Mutex::new(None)),
            grant: Mutex::new(PermissionState::Granted),
            fast_responses: Mutex::new(VecDeque::new()),
            accurate_responses: Mutex::new(VecDeque::new()),
            watch_script: Mutex::new(Vec::new()),
            fail_watch: Mutex::new(None),
        }
    }

    pub fn with_permission(self, state: PermissionState) -> Self {
        *self.grant.lock().unwrap() = state;
        self
    }

    /// Queue a response for the next fast (low-accuracy) request
    pub fn push_fast(&self, response: MockResponse) {
        self.fast_responses.lock().unwrap().push_back(response);
    }

    /// Queue a response for the next accurate request
    pub fn push_accurate(&self, response: MockResponse) {
        self.accurate_responses.lock().unwrap().push_back(response);
    }

    /// Script the items delivered by the next watch
    pub fn script_watch(&self, items: Vec<MockResponse>) {
        *self.watch_script.lock().unwrap() = items;
    }

    /// Push an item into the active watch. Returns false if no watch is active.
    pub fn emit_watch(&self, item: LocationResult<Fix>) -> bool {
        match &*self.active_watch.lock().unwrap() {
            Some((_, tx)) => tx.send(item).is_ok(),
            None => false,
        }
    }

    pub fn permission_prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn fast_requests(&self) -> u32 {
        self.fast_requests.load(Ordering::SeqCst)
    }

    pub fn accurate_requests(&self) -> u32 {
        self.accurate_requests.load(Ordering::SeqCst)
    }

    pub fn watches_started(&self) -> u32 {
        self.watches_started.load(Ordering::SeqCst)
    }

    pub fn watches_stopped(&self) -> u32 {
        self.watches_stopped.load(Ordering::SeqCst)
    }

    pub fn active_watches(&self) -> u32 {
        self.watches_started() - self.watches_stopped()
    }

    pub fn last_watch_request(&self) -> Option<FixRequest> {
        *self.last_watch_request.lock().unwrap()
    }

    async fn check_permission(&self) -> LocationResult<()> {
        self.permission
            .require(|| async {
                self.prompts.fetch_add(1, Ordering::SeqCst);
                *self.grant.lock().unwrap()
            })
            .await
    }
}

impl Default for MockLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationSource for MockLocationSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request_single_fix(&self, request: FixRequest) -> LocationResult<Fix> {
        self.check_permission().await?;

        let response = if request.high_accuracy {
            self.accurate_requests.fetch_add(1, Ordering::SeqCst);
            self.accurate_responses.lock().unwrap().pop_front()
        } else {
            self.fast_requests.fetch_add(1, Ordering::SeqCst);
            self.fast_responses.lock().unwrap().pop_front()
        };

        match response {
            Some(response) => {
                tokio::time::sleep(response.delay).await;
                response.result
            }
            None => {
                tokio::time::sleep(request.timeout).await;
                Err(LocationError::Timeout(request.timeout))
            }
        }
    }

    async fn start_watch(&self, request: FixRequest) -> LocationResult<WatchSubscription> {
        self.check_permission().await?;

        if let Some(error) = self.fail_watch.lock().unwrap().take() {
            return Err(error);
        }

        let id = WatchId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.active_watch.lock().unwrap() = Some((id, tx.clone()));
        *self.last_watch_request.lock().unwrap() = Some(request);
        self.watches_started.fetch_add(1, Ordering::SeqCst);

        let script = std::mem::take(&mut *self.watch_script.lock().unwrap());
        if !script.is_empty() {
            tokio::spawn(async move {
                for item in script {
                    tokio::time::sleep(item.delay).await;
                    if tx.send(item.result).is_err() {
                        break;
                    }
                }
            });
        }

        let stopped = self.watches_stopped.clone();
        let slot = self.active_watch.clone();
        Ok(WatchSubscription::new(id, request, rx, move || {
            stopped.fetch_add(1, Ordering::SeqCst);
            let mut slot = slot.lock().unwrap();
            if matches!(&*slot, Some((active, _)) if *active == id) {
                slot.take();
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_api::Coordinates;
    use rollcall_util::MonotonicInstant;

    fn fix(accuracy_m: f64) -> Fix {
        Fix::new(Coordinates::new(-6.2, 106.8), accuracy_m, MonotonicInstant::now())
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_single_fixes_by_accuracy_class() {
        let source = MockLocationSource::new();
        source.push_fast(MockResponse::fix(Duration::from_millis(100), fix(80.0)));
        source.push_accurate(MockResponse::error(
            Duration::from_millis(100),
            LocationError::Unavailable("gps off".into()),
        ));

        let fast = source.request_single_fix(FixRequest::fast()).await.unwrap();
        assert_eq!(fast.accuracy_m, 80.0);

        let accurate = source.request_single_fix(FixRequest::accurate()).await;
        assert!(matches!(accurate, Err(LocationError::Unavailable(_))));

        assert_eq!(source.fast_requests(), 1);
        assert_eq!(source.accurate_requests(), 1);
        assert_eq!(source.permission_prompts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let source = MockLocationSource::new();
        let result = source.request_single_fix(FixRequest::fast()).await;
        assert_eq!(result, Err(LocationError::Timeout(Duration::from_secs(3))));
    }

    #[tokio::test]
    async fn denied_permission_fails_every_request() {
        let source = MockLocationSource::new().with_permission(PermissionState::Denied);

        assert!(matches!(
            source.request_single_fix(FixRequest::fast()).await,
            Err(LocationError::PermissionDenied(_))
        ));
        assert!(matches!(
            source.start_watch(FixRequest::watch()).await,
            Err(LocationError::PermissionDenied(_))
        ));
        assert_eq!(source.permission_prompts(), 1);
    }

    #[tokio::test]
    async fn watch_emits_and_stops_once() {
        let source = MockLocationSource::new();
        let mut watch = source.start_watch(FixRequest::watch()).await.unwrap();
        assert_eq!(source.active_watches(), 1);

        let reading = fix(9.0);
        assert!(source.emit_watch(Ok(reading)));
        assert_eq!(watch.next().await, Some(Ok(reading)));

        watch.stop();
        watch.stop();
        drop(watch);

        assert_eq!(source.watches_stopped(), 1);
        assert_eq!(source.active_watches(), 0);
        assert!(!source.emit_watch(Ok(reading)));
    }
}
