//! Great-circle distance on a spherical earth.

use crate::track::TrackPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two lat/lon pairs given in degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push `a` just outside [0, 1] for antipodal or identical inputs
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Distance in meters between two track points, ignoring elevation.
pub fn distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}
