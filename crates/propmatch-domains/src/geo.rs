const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two lat/lng points.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point() {
        let d = haversine_meters(44.4274, 26.1032, 44.4274, 26.1032);
        assert!(d < 0.01);
    }

    #[test]
    fn test_adjacent_building() {
        // One step in the 4th decimal is ~11m of latitude
        let d = haversine_meters(44.4274, 26.1032, 44.4275, 26.1033);
        assert!(d > 5.0 && d < 30.0, "Expected ~14m, got {d}");
    }

    #[test]
    fn test_across_town() {
        // Unirii to Baneasa, Bucharest (~8km)
        let d = haversine_meters(44.4274, 26.1032, 44.5000, 26.0800);
        assert!(d > 5_000.0 && d < 12_000.0, "Expected ~8km, got {d}");
    }
}
