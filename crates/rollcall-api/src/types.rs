//! Location and geofence types

use rollcall_util::MonotonicInstant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether both components are finite and within WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// A single location reading.
///
/// Produced by a location source and never mutated afterwards; newer
/// readings supersede it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinates: Coordinates,

    /// Radius of the reported uncertainty, in meters
    pub accuracy_m: f64,

    /// When the platform captured this reading
    pub captured_at: MonotonicInstant,
}

impl Fix {
    pub fn new(coordinates: Coordinates, accuracy_m: f64, captured_at: MonotonicInstant) -> Self {
        Self {
            coordinates,
            accuracy_m,
            captured_at,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates.longitude
    }
}

/// Options for a single-shot or continuous fix request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixRequest {
    /// Ask the platform for its expensive, high-accuracy provider
    pub high_accuracy: bool,

    /// How long the platform may take before reporting a timeout
    pub timeout: Duration,

    /// Oldest platform-cached reading that may be returned
    pub max_age: Duration,
}

impl FixRequest {
    /// Cheap, coarse request used to get something on screen quickly
    pub fn fast() -> Self {
        Self {
            high_accuracy: false,
            timeout: Duration::from_millis(3_000),
            max_age: Duration::from_millis(60_000),
        }
    }

    /// Expensive, high-accuracy single request
    pub fn accurate() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(8_000),
            max_age: Duration::from_millis(10_000),
        }
    }

    /// Continuous high-accuracy subscription
    pub fn watch() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(10_000),
            max_age: Duration::from_millis(5_000),
        }
    }
}

/// Coarse reason a location request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationFailure {
    PermissionDenied,
    Unavailable,
    Timeout,
    Unknown,
}

impl fmt::Display for LocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocationFailure::PermissionDenied => "permission denied",
            LocationFailure::Unavailable => "unavailable",
            LocationFailure::Timeout => "timeout",
            LocationFailure::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Administrator-configured acceptance circle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceGeofence {
    /// Center of the circle; `None` when no location was ever configured
    pub center: Option<Coordinates>,

    /// Acceptance radius in meters; zero or less means unconfigured
    pub radius_m: f64,
}

impl ReferenceGeofence {
    pub fn new(center: Coordinates, radius_m: f64) -> Self {
        Self {
            center: Some(center),
            radius_m,
        }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Returns the center if both center and a positive radius are set
    pub fn configured_center(&self) -> Option<Coordinates> {
        match self.center {
            Some(center) if self.radius_m > 0.0 => Some(center),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured_center().is_some()
    }
}

/// Zone classification of a fix against the reference geofence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Inside,
    NearBoundary,
    Outside,
    Unconfigured,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Zone::Inside => "inside",
            Zone::NearBoundary => "near_boundary",
            Zone::Outside => "outside",
            Zone::Unconfigured => "unconfigured",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inside" => Ok(Zone::Inside),
            "near_boundary" => Ok(Zone::NearBoundary),
            "outside" => Ok(Zone::Outside),
            "unconfigured" => Ok(Zone::Unconfigured),
            other => Err(format!("unknown zone '{}'", other)),
        }
    }
}

/// Result of evaluating one fix against the geofence.
///
/// Derived data: recomputed on every accepted fix and never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneVerdict {
    pub zone: Zone,

    /// Great-circle distance from the fix to the geofence center
    pub distance_m: Option<f64>,

    /// Distance minus the fix accuracy, floored at zero
    pub effective_distance_m: Option<f64>,

    /// Accuracy of the fix this verdict was computed from
    pub accuracy_m: f64,

    /// Radius the fix was compared against
    pub radius_m: f64,

    /// Human-readable status line for the UI
    pub message: String,
}

/// Live location state exposed to the status UI and consumed by the gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocationStatus {
    /// No usable fix (not acquired yet, cleared by a refresh, or stale)
    NoFix,

    /// Acquisition ended without any fix
    Unavailable { failure: LocationFailure },

    /// A fix is published and has been evaluated
    Located { verdict: ZoneVerdict },
}

impl LocationStatus {
    pub fn verdict(&self) -> Option<&ZoneVerdict> {
        match self {
            LocationStatus::Located { verdict } => Some(verdict),
            _ => None,
        }
    }

    pub fn is_located(&self) -> bool {
        matches!(self, LocationStatus::Located { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geofence_requires_center_and_positive_radius() {
        let center = Coordinates::new(-6.2, 106.8);
        assert!(ReferenceGeofence::new(center, 100.0).is_configured());
        assert!(!ReferenceGeofence::new(center, 0.0).is_configured());
        assert!(!ReferenceGeofence::new(center, -5.0).is_configured());
        assert!(!ReferenceGeofence::unconfigured().is_configured());
    }

    #[test]
    fn coordinates_validity() {
        assert!(Coordinates::new(0.0, 0.0).is_valid());
        assert!(Coordinates::new(-90.0, 180.0).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn default_requests_match_phase_budgets() {
        assert!(!FixRequest::fast().high_accuracy);
        assert_eq!(FixRequest::fast().timeout, Duration::from_secs(3));
        assert_eq!(FixRequest::accurate().max_age, Duration::from_secs(10));
        assert_eq!(FixRequest::watch().timeout, Duration::from_secs(10));
    }

    #[test]
    fn status_serialization_is_tagged() {
        let status = LocationStatus::Unavailable {
            failure: LocationFailure::PermissionDenied,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"state":"unavailable","failure":"permission_denied"}"#);

        let json = serde_json::to_string(&LocationStatus::NoFix).unwrap();
        assert_eq!(json, r#"{"state":"no_fix"}"#);
    }
}
