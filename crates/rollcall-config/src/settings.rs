//! Validated settings structures

use crate::schema::{RawAcquisition, RawConfig, RawGeofence, RawServiceConfig};
use rollcall_api::{
    AttendanceType, Coordinates, FixRequest, ReferenceGeofence, default_attendance_types,
};
use rollcall_util::{AttendanceTypeId, RollcallError, default_data_dir, default_log_dir};
use std::path::PathBuf;
use std::time::Duration;

/// How long a fix may short-circuit acquisition or back a submission
pub const DEFAULT_CACHE_VALIDITY: Duration = Duration::from_millis(30_000);

/// Minimum movement for a same-or-worse accuracy fix to replace the published one
pub const DEFAULT_HYSTERESIS_M: f64 = 5.0;

/// Total accurate-phase attempts
pub const DEFAULT_ACCURATE_ATTEMPTS: u32 = 3;

/// Delay between accurate-phase attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(1_000);

/// Validated settings ready for use by the attendance portal
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceConfig,
    pub geofence: ReferenceGeofence,
    pub acquisition: AcquisitionPolicy,
    pub cache_validity: Duration,
    pub attendance_types: Vec<AttendanceType>,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let attendance_types = raw
            .attendance_types
            .map(|types| {
                types
                    .into_iter()
                    .map(|t| AttendanceType {
                        id: AttendanceTypeId::new(t.id),
                        label: t.label,
                        presence: t.presence,
                    })
                    .collect()
            })
            .unwrap_or_else(default_attendance_types);

        Self {
            service: ServiceConfig::from_raw(raw.service),
            geofence: raw.geofence.map(convert_geofence).unwrap_or_default(),
            acquisition: AcquisitionPolicy::from_raw(&raw.acquisition),
            cache_validity: raw
                .cache
                .validity_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CACHE_VALIDITY),
            attendance_types,
        }
    }

    /// Get an attendance type by ID
    pub fn attendance_type(&self, id: &AttendanceTypeId) -> Option<&AttendanceType> {
        self.attendance_types.iter().find(|t| &t.id == id)
    }

    /// Like [`Settings::attendance_type`] but unknown IDs are an error
    pub fn require_attendance_type(
        &self,
        id: &AttendanceTypeId,
    ) -> rollcall_util::Result<&AttendanceType> {
        self.attendance_type(id)
            .ok_or_else(|| RollcallError::UnknownAttendanceType(id.clone()))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            geofence: ReferenceGeofence::unconfigured(),
            acquisition: AcquisitionPolicy::default(),
            cache_validity: DEFAULT_CACHE_VALIDITY,
            attendance_types: default_attendance_types(),
        }
    }
}

fn convert_geofence(raw: RawGeofence) -> ReferenceGeofence {
    let center = match (raw.center_latitude, raw.center_longitude) {
        (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
        _ => None,
    };

    ReferenceGeofence {
        center,
        radius_m: raw.radius_meters.unwrap_or(0.0),
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_dir: raw.log_dir.unwrap_or_else(default_log_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }
}

/// Request options and retry policy for each acquisition phase
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionPolicy {
    pub fast: FixRequest,
    pub accurate: FixRequest,
    pub accurate_attempts: u32,
    pub retry_backoff: Duration,
    pub watch: FixRequest,
    pub hysteresis_m: f64,
}

impl AcquisitionPolicy {
    fn from_raw(raw: &RawAcquisition) -> Self {
        let defaults = Self::default();
        let ms = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            fast: FixRequest {
                high_accuracy: false,
                timeout: ms(raw.fast_timeout_ms, defaults.fast.timeout),
                max_age: ms(raw.fast_max_age_ms, defaults.fast.max_age),
            },
            accurate: FixRequest {
                high_accuracy: true,
                timeout: ms(raw.accurate_timeout_ms, defaults.accurate.timeout),
                max_age: ms(raw.accurate_max_age_ms, defaults.accurate.max_age),
            },
            accurate_attempts: raw.accurate_attempts.unwrap_or(defaults.accurate_attempts),
            retry_backoff: ms(raw.retry_backoff_ms, defaults.retry_backoff),
            watch: FixRequest {
                high_accuracy: true,
                timeout: ms(raw.watch_timeout_ms, defaults.watch.timeout),
                max_age: ms(raw.watch_max_age_ms, defaults.watch.max_age),
            },
            hysteresis_m: raw.hysteresis_meters.unwrap_or(defaults.hysteresis_m),
        }
    }
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            fast: FixRequest::fast(),
            accurate: FixRequest::accurate(),
            accurate_attempts: DEFAULT_ACCURATE_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            watch: FixRequest::watch(),
            hysteresis_m: DEFAULT_HYSTERESIS_M,
        }
    }
}
