//! Configuration validation

use crate::schema::{RawAcquisition, RawAttendanceType, RawConfig, RawGeofence};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Geofence: {0}")]
    GeofenceError(String),

    #[error("Acquisition setting '{field}': {message}")]
    AcquisitionError { field: String, message: String },

    #[error("Cache: {0}")]
    CacheError(String),

    #[error("Attendance type '{type_id}': {message}")]
    AttendanceTypeError { type_id: String, message: String },

    #[error("Duplicate attendance type ID: {0}")]
    DuplicateAttendanceType(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(geofence) = &config.geofence {
        errors.extend(validate_geofence(geofence));
    }

    errors.extend(validate_acquisition(&config.acquisition));

    if config.cache.validity_ms == Some(0) {
        errors.push(ValidationError::CacheError(
            "validity_ms must be greater than 0".into(),
        ));
    }

    if let Some(types) = &config.attendance_types {
        errors.extend(validate_attendance_types(types));
    }

    errors
}

fn validate_geofence(geofence: &RawGeofence) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match (geofence.center_latitude, geofence.center_longitude) {
        (Some(lat), Some(lon)) => {
            if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                errors.push(ValidationError::GeofenceError(format!(
                    "center_latitude {} is outside -90..=90",
                    lat
                )));
            }
            if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                errors.push(ValidationError::GeofenceError(format!(
                    "center_longitude {} is outside -180..=180",
                    lon
                )));
            }
        }
        (None, None) => {}
        _ => errors.push(ValidationError::GeofenceError(
            "center_latitude and center_longitude must be set together".into(),
        )),
    }

    if let Some(radius) = geofence.radius_meters
        && (!radius.is_finite() || radius < 0.0)
    {
        errors.push(ValidationError::GeofenceError(format!(
            "radius_meters {} must be a non-negative number",
            radius
        )));
    }

    errors
}

fn validate_acquisition(acquisition: &RawAcquisition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let durations = [
        ("fast_timeout_ms", acquisition.fast_timeout_ms),
        ("accurate_timeout_ms", acquisition.accurate_timeout_ms),
        ("watch_timeout_ms", acquisition.watch_timeout_ms),
    ];
    for (field, value) in durations {
        if value == Some(0) {
            errors.push(ValidationError::AcquisitionError {
                field: field.into(),
                message: "must be greater than 0".into(),
            });
        }
    }

    if acquisition.accurate_attempts == Some(0) {
        errors.push(ValidationError::AcquisitionError {
            field: "accurate_attempts".into(),
            message: "at least one attempt is required".into(),
        });
    }

    if let Some(hysteresis) = acquisition.hysteresis_meters
        && (!hysteresis.is_finite() || hysteresis < 0.0)
    {
        errors.push(ValidationError::AcquisitionError {
            field: "hysteresis_meters".into(),
            message: format!("{} must be a non-negative number", hysteresis),
        });
    }

    errors
}

fn validate_attendance_types(types: &[RawAttendanceType]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();

    for kind in types {
        if kind.id.trim().is_empty() {
            errors.push(ValidationError::AttendanceTypeError {
                type_id: kind.id.clone(),
                message: "id cannot be empty".into(),
            });
        } else if kind.id.contains(char::is_whitespace) {
            errors.push(ValidationError::AttendanceTypeError {
                type_id: kind.id.clone(),
                message: "id cannot contain whitespace".into(),
            });
        }

        if kind.label.trim().is_empty() {
            errors.push(ValidationError::AttendanceTypeError {
                type_id: kind.id.clone(),
                message: "label cannot be empty".into(),
            });
        }

        if !seen_ids.insert(kind.id.as_str()) {
            errors.push(ValidationError::DuplicateAttendanceType(kind.id.clone()));
        }
    }

    errors
}
