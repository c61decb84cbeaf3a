use crate::common::models::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates (haversine).
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Move `from` straight toward `to` by `meters`, clamping at the target.
/// Good enough for city-scale simulation; not a geodesic solver.
pub fn step_towards(from: GeoPoint, to: GeoPoint, meters: f64) -> GeoPoint {
    let total = haversine_meters(from, to);
    if total <= meters || total == 0.0 {
        return to;
    }
    let t = meters / total;
    GeoPoint::new(
        from.lat + (to.lat - from.lat) * t,
        from.lng + (to.lng - from.lng) * t,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_paris_landmarks() {
        // Notre-Dame area to the Eiffel Tower, roughly 4.2 km.
        let a = GeoPoint::new(48.8566, 2.3522);
        let b = GeoPoint::new(48.8584, 2.2945);
        let d = haversine_meters(a, b);
        assert!(d > 4_000.0 && d < 4_500.0, "got {}", d);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(48.8566, 2.3522);
        assert_eq!(haversine_meters(p, p), 0.0);
    }

    #[test]
    fn step_towards_shrinks_distance_and_clamps() {
        let a = GeoPoint::new(48.8566, 2.3522);
        let b = GeoPoint::new(48.8584, 2.2945);
        let before = haversine_meters(a, b);

        let moved = step_towards(a, b, 500.0);
        let after = haversine_meters(moved, b);
        assert!(after < before);
        assert!((before - after - 500.0).abs() < 50.0, "step was {}", before - after);

        // A step longer than the remaining distance lands on the target.
        let landed = step_towards(a, b, before * 2.0);
        assert_eq!(landed, b);
    }
}
