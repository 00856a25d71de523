//! Geofence evaluation

use rollcall_api::{Coordinates, Fix, ReferenceGeofence, Zone, ZoneVerdict};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, in meters (haversine)
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Classify a fix against the reference geofence.
///
/// The fix's own accuracy is credited toward the radius: a fix counts as
/// inside when `distance - accuracy <= radius`. A fix that misses by no more
/// than its accuracy is near the boundary.
pub fn evaluate(fix: &Fix, geofence: &ReferenceGeofence) -> ZoneVerdict {
    let accuracy_m = fix.accuracy_m.max(0.0);

    let Some(center) = geofence.configured_center() else {
        return ZoneVerdict {
            zone: Zone::Unconfigured,
            distance_m: None,
            effective_distance_m: None,
            accuracy_m,
            radius_m: geofence.radius_m,
            message: "The attendance location is not configured; contact an administrator"
                .to_string(),
        };
    };

    let radius_m = geofence.radius_m;
    let distance_m = haversine_m(fix.coordinates, center);
    let effective_m = (distance_m - accuracy_m).max(0.0);

    let zone = if effective_m <= radius_m {
        Zone::Inside
    } else if effective_m - radius_m <= accuracy_m {
        Zone::NearBoundary
    } else {
        Zone::Outside
    };

    let message = match zone {
        Zone::Inside => format!(
            "Inside the attendance area ({:.0} m from the center, accuracy ±{:.0} m)",
            distance_m, accuracy_m
        ),
        Zone::NearBoundary => format!(
            "Near the edge of the attendance area ({:.0} m from the center, radius {:.0} m, accuracy ±{:.0} m); attendance will be recorded with a warning",
            distance_m, radius_m, accuracy_m
        ),
        _ => format!(
            "Outside the attendance area ({:.0} m from the center, radius {:.0} m, accuracy ±{:.0} m)",
            distance_m, radius_m, accuracy_m
        ),
    };

    ZoneVerdict {
        zone,
        distance_m: Some(distance_m),
        effective_distance_m: Some(effective_m),
        accuracy_m,
        radius_m,
        message,
    }
}
