use anyhow::Result;

/// Application configuration loaded from environment variables.
///
/// Match thresholds and weights are policy, not derived from data — they are
/// exposed here so operators can tune them without a rebuild.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // Group admission
    pub fuzzy_join_threshold: f64,
    pub adhoc_sentinel_score: f64,

    // Fuzzy factor weights
    pub weight_text: f64,
    pub weight_geo: f64,
    pub weight_area: f64,
    pub weight_price: f64,

    // Candidate window for the fuzzy fallback
    pub candidate_limit: i64,
    pub candidate_window_days: i64,

    // Signature price banding
    pub price_band_size: f64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            fuzzy_join_threshold: env_f64("FUZZY_JOIN_THRESHOLD", 0.7),
            adhoc_sentinel_score: env_f64("ADHOC_SENTINEL_SCORE", 0.5),
            weight_text: env_f64("WEIGHT_TEXT", 0.35),
            weight_geo: env_f64("WEIGHT_GEO", 0.35),
            weight_area: env_f64("WEIGHT_AREA", 0.15),
            weight_price: env_f64("WEIGHT_PRICE", 0.15),
            candidate_limit: env_i64("CANDIDATE_LIMIT", 80),
            candidate_window_days: env_i64("CANDIDATE_WINDOW_DAYS", 45),
            price_band_size: env_f64("PRICE_BAND_SIZE", 1000.0),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            fuzzy_join_threshold: 0.7,
            adhoc_sentinel_score: 0.5,
            weight_text: 0.35,
            weight_geo: 0.35,
            weight_area: 0.15,
            weight_price: 0.15,
            candidate_limit: 80,
            candidate_window_days: 45,
            price_band_size: 1000.0,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
