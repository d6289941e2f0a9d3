use propmatch_core::ListingFeatures;

/// Build the deterministic composite key for a listing.
///
/// Coordinates round to 4 decimal places (~11m precision), area to the
/// nearest whole m², price into fixed-size bands. Floor and year are
/// optional qualifiers. Returns `None` when any of lat/lng/area/price is
/// missing — callers treat that as a normal branch, not an error.
///
/// The key format is a contract: other components only ever compare keys
/// for equality, never parse them.
pub fn build_signature(features: &ListingFeatures, price_band_size: f64) -> Option<String> {
    let lat = features.latitude?;
    let lng = features.longitude?;
    let area = features.area_m2?;
    let price = features.price?;

    let band = (price / price_band_size).floor() as i64;
    let level = features
        .floor
        .map(|f| f.to_string())
        .unwrap_or_else(|| "-".to_string());
    let year = features
        .year_built
        .map(|y| y.to_string())
        .unwrap_or_else(|| "-".to_string());

    Some(format!(
        "geo:{lat:.4},{lng:.4}|m2:{}|k:{band}|L:{level}|Y:{year}",
        area.round() as i64
    ))
}
