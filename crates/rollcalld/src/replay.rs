//! Location source that replays recorded samples
//!
//! Samples are read from newline-delimited JSON, one per line:
//!
//! ```text
//! {"latitude": -6.2, "longitude": 106.8, "accuracy_m": 35.0, "delay_ms": 400}
//! {"error": "timeout", "delay_ms": 3000}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rollcall_api::{Coordinates, Fix, FixRequest, LocationFailure};
use rollcall_location_api::{
    LocationError, LocationResult, LocationSource, PermissionLatch, PermissionState,
    WatchSubscription,
};
use rollcall_util::{MonotonicInstant, WatchId};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One recorded sample
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplaySample {
    Fix {
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
        #[serde(default)]
        delay_ms: u64,
    },
    Failure {
        error: LocationFailure,
        #[serde(default)]
        delay_ms: u64,
    },
}

impl ReplaySample {
    fn delay(&self) -> Duration {
        match self {
            ReplaySample::Fix { delay_ms, .. } | ReplaySample::Failure { delay_ms, .. } => {
                Duration::from_millis(*delay_ms)
            }
        }
    }

    /// Turn the sample into a result, stamping fixes with the current time
    fn materialize(&self) -> LocationResult<Fix> {
        match self {
            ReplaySample::Fix {
                latitude,
                longitude,
                accuracy_m,
                ..
            } => Ok(Fix::new(
                Coordinates::new(*latitude, *longitude),
                *accuracy_m,
                MonotonicInstant::now(),
            )),
            ReplaySample::Failure { error, delay_ms } => Err(match error {
                LocationFailure::PermissionDenied => {
                    LocationError::PermissionDenied("replayed denial".into())
                }
                LocationFailure::Unavailable => {
                    LocationError::Unavailable("replayed outage".into())
                }
                LocationFailure::Timeout => {
                    LocationError::Timeout(Duration::from_millis(*delay_ms))
                }
                LocationFailure::Unknown => LocationError::Unknown("replayed failure".into()),
            }),
        }
    }
}

/// Parse newline-delimited JSON samples
pub fn parse_samples(input: &str) -> Result<Vec<ReplaySample>> {
    let mut samples = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sample = serde_json::from_str(line)
            .with_context(|| format!("Invalid replay sample on line {}", index + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Location source backed by a fixed list of samples.
///
/// Single-fix requests and watches draw from one shared cursor, so a replay
/// file reads as the sequence of readings the device would have produced.
/// Once the samples run out, single-fix requests repeat the last one and
/// watches go quiet.
pub struct ReplaySource {
    samples: Vec<ReplaySample>,
    cursor: Arc<Mutex<usize>>,
    permission: PermissionLatch,
    grant: PermissionState,
}

impl ReplaySource {
    pub fn new(samples: Vec<ReplaySample>, grant: PermissionState) -> Self {
        Self {
            samples,
            cursor: Arc::new(Mutex::new(0)),
            permission: PermissionLatch::new(),
            grant,
        }
    }

    pub fn from_path(path: &Path, grant: PermissionState) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {:?}", path))?;
        let samples = parse_samples(&input)?;
        info!(path = %path.display(), samples = samples.len(), "Replay samples loaded");
        Ok(Self::new(samples, grant))
    }

    fn next_sample(&self) -> Option<ReplaySample> {
        let mut cursor = self.cursor.lock().unwrap();
        let sample = self
            .samples
            .get(*cursor)
            .or_else(|| self.samples.last())
            .cloned();
        if *cursor < self.samples.len() {
            *cursor += 1;
        }
        sample
    }

    async fn check_permission(&self) -> LocationResult<()> {
        let grant = self.grant;
        self.permission
            .require(|| async move {
                info!(?grant, "Location permission prompt answered");
                grant
            })
            .await
    }
}

#[async_trait]
impl LocationSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    async fn request_single_fix(&self, request: FixRequest) -> LocationResult<Fix> {
        self.check_permission().await?;

        let Some(sample) = self.next_sample() else {
            return Err(LocationError::Unavailable("no replay samples".into()));
        };

        debug!(high_accuracy = request.high_accuracy, ?sample, "Replaying single fix");
        tokio::time::sleep(sample.delay()).await;
        sample.materialize()
    }

    async fn start_watch(&self, request: FixRequest) -> LocationResult<WatchSubscription> {
        self.check_permission().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let samples = self.samples.clone();
        let cursor = self.cursor.clone();

        let feeder = tokio::spawn(async move {
            loop {
                let sample = {
                    let mut cursor = cursor.lock().unwrap();
                    let Some(sample) = samples.get(*cursor).cloned() else {
                        break;
                    };
                    *cursor += 1;
                    sample
                };
                tokio::time::sleep(sample.delay()).await;
                if tx.send(sample.materialize()).is_err() {
                    break;
                }
            }
            debug!("Replay watch has no more samples");
            // Keep the channel open so the watch stays silent rather than closed
            tx.closed().await;
        });

        Ok(WatchSubscription::new(WatchId::new(), request, rx, move || {
            feeder.abort();
        }))
    }
}
