//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Reference geofence; absent means unconfigured
    #[serde(default)]
    pub geofence: Option<RawGeofence>,

    /// Fix acquisition tuning
    #[serde(default)]
    pub acquisition: RawAcquisition,

    /// Freshness cache settings
    #[serde(default)]
    pub cache: RawCache,

    /// Attendance types; absent means the built-in set
    #[serde(default)]
    pub attendance_types: Option<Vec<RawAttendanceType>>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the record store
    pub data_dir: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,
}

/// Reference geofence as entered by the administrator
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGeofence {
    pub center_latitude: Option<f64>,
    pub center_longitude: Option<f64>,

    /// Acceptance radius; 0 disables the geofence
    pub radius_meters: Option<f64>,
}

/// Fix acquisition tuning, all in milliseconds unless noted
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAcquisition {
    pub fast_timeout_ms: Option<u64>,
    pub fast_max_age_ms: Option<u64>,
    pub accurate_timeout_ms: Option<u64>,
    pub accurate_max_age_ms: Option<u64>,

    /// Total accurate-phase attempts, including the first
    pub accurate_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub watch_timeout_ms: Option<u64>,
    pub watch_max_age_ms: Option<u64>,

    /// Minimum movement (meters) for a same-or-worse accuracy fix to replace
    /// the published one
    pub hysteresis_meters: Option<f64>,
}

/// Freshness cache settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCache {
    /// How long a cached fix may short-circuit acquisition
    pub validity_ms: Option<u64>,
}

/// Attendance type definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAttendanceType {
    pub id: String,
    pub label: String,

    /// Presence types are geofenced; declaration types require a reason
    #[serde(default = "default_presence")]
    pub presence: bool,
}

fn default_presence() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            data_dir = "/var/lib/rollcall"

            [geofence]
            center_latitude = -6.2
            center_longitude = 106.8
            radius_meters = 150.0

            [acquisition]
            accurate_attempts = 5
            hysteresis_meters = 3.5

            [cache]
            validity_ms = 20000

            [[attendance_types]]
            id = "check_in"
            label = "Check in"

            [[attendance_types]]
            id = "leave"
            label = "Leave"
            presence = false
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        let types = config.attendance_types.unwrap();
        assert_eq!(types.len(), 2);
        assert!(types[0].presence);
        assert!(!types[1].presence);
        assert_eq!(config.acquisition.accurate_attempts, Some(5));
        assert_eq!(config.cache.validity_ms, Some(20000));
        assert_eq!(config.geofence.unwrap().radius_meters, Some(150.0));
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.geofence.is_none());
        assert!(config.attendance_types.is_none());
        assert!(config.acquisition.fast_timeout_ms.is_none());
    }
}
