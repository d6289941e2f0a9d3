use std::collections::BTreeMap;

use propmatch_core::{AppConfig, ListingFeatures};

use crate::geo::haversine_meters;
use crate::grouping::similarity::trigram_similarity;

/// Weighted multi-factor similarity between two feature bundles.
///
/// `factors` maps each factor name to its weighted contribution to the
/// total. A factor is present in the map only when both sides carried the
/// required fields — missing data is neither a match nor a mismatch.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyScore {
    pub total: f64,
    pub factors: BTreeMap<String, f64>,
}

/// Score two feature bundles against each other.
///
/// Weights come from config so no single noisy field can dominate: with the
/// defaults, two independent strong signals (same building + same price)
/// clear the join threshold, one alone does not.
pub fn fuzzy_score(a: &ListingFeatures, b: &ListingFeatures, config: &AppConfig) -> FuzzyScore {
    let mut factors = BTreeMap::new();
    let mut total = 0.0;

    if let Some(sim) = text_subscore(a, b) {
        let contribution = sim * config.weight_text;
        factors.insert("text".to_string(), contribution);
        total += contribution;
    }

    if let Some(sub) = geo_subscore(a, b) {
        let contribution = sub * config.weight_geo;
        factors.insert("geo".to_string(), contribution);
        total += contribution;
    }

    if let (Some(x), Some(y)) = (a.area_m2, b.area_m2) {
        let contribution = banded_subscore(x, y, 0.05, 0.10) * config.weight_area;
        factors.insert("area".to_string(), contribution);
        total += contribution;
    }

    if let (Some(x), Some(y)) = (a.price, b.price) {
        let contribution = banded_subscore(x, y, 0.07, 0.12) * config.weight_price;
        factors.insert("price".to_string(), contribution);
        total += contribution;
    }

    FuzzyScore { total, factors }
}

fn text_subscore(a: &ListingFeatures, b: &ListingFeatures) -> Option<f64> {
    let ta = a.title.as_deref().filter(|t| !t.trim().is_empty())?;
    let tb = b.title.as_deref().filter(|t| !t.trim().is_empty())?;
    Some(trigram_similarity(ta, tb))
}

/// Step function over distance rather than continuous decay: GPS noise on
/// scraped listings makes small distance differences meaningless, while
/// "basically the same building" still deserves full credit.
fn geo_subscore(a: &ListingFeatures, b: &ListingFeatures) -> Option<f64> {
    let (lat1, lng1) = (a.latitude?, a.longitude?);
    let (lat2, lng2) = (b.latitude?, b.longitude?);
    let distance = haversine_meters(lat1, lng1, lat2, lng2);
    Some(if distance <= 60.0 {
        1.0
    } else if distance <= 120.0 {
        0.6
    } else if distance <= 250.0 {
        0.3
    } else {
        0.0
    })
}

/// Relative-difference step score: within `tight` scores 1.0, within
/// `loose` scores 0.5, else 0.
fn banded_subscore(a: f64, b: f64, tight: f64, loose: f64) -> f64 {
    let diff = relative_diff(a, b);
    if diff <= tight {
        1.0
    } else if diff <= loose {
        0.5
    } else {
        0.0
    }
}

fn relative_diff(a: f64, b: f64) -> f64 {
    let max = a.abs().max(b.abs());
    if max == 0.0 {
        0.0
    } else {
        (a - b).abs() / max
    }
}
