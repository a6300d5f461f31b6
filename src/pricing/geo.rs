//! Great-circle distance between ZIP locations.

use rust_decimal::prelude::*;

use super::calculators::round_money;
use super::models::Location;

/// Mean Earth radius in miles
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance in miles between two lat/lon points (degrees).
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Distance in miles, rounded to 0.01.
///
/// Returns `None` when either location lacks coordinates. Unknown is not
/// zero; substituting a fallback is the caller's decision.
pub fn resolve_distance(a: &Location, b: &Location) -> Option<Decimal> {
    let (lat1, lon1) = a.coordinates()?;
    let (lat2, lon2) = b.coordinates()?;
    let miles = Decimal::from_f64(haversine_miles(lat1, lon1, lat2, lon2))?;
    Some(round_money(miles, 2))
}
