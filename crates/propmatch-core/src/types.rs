use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for [`ListingFeatures`] payloads.
pub const FEATURES_SCHEMA_VERSION: i32 = 1;

fn default_schema_version() -> i32 {
    FEATURES_SCHEMA_VERSION
}

/// Normalized fields extracted from one scraped listing page.
///
/// Every payload field is optional — scrapers routinely miss fields, and the
/// engine must treat any subset being absent as normal. Prices are assumed
/// pre-normalized to a single currency by the extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingFeatures {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,

    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub floor: Option<i32>,
    pub year_built: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub title: Option<String>,
    pub city: Option<String>,
    pub area_label: Option<String>,
    pub photo_url: Option<String>,
}

impl Default for ListingFeatures {
    fn default() -> Self {
        Self {
            schema_version: FEATURES_SCHEMA_VERSION,
            price: None,
            area_m2: None,
            rooms: None,
            floor: None,
            year_built: None,
            latitude: None,
            longitude: None,
            title: None,
            city: None,
            area_label: None,
            photo_url: None,
        }
    }
}

impl ListingFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field-completeness score in 0..=6: one point each for price, area,
    /// rooms, year built, both coordinates, and a title.
    pub fn completeness(&self) -> i32 {
        let mut score = 0;
        if self.price.is_some() {
            score += 1;
        }
        if self.area_m2.is_some() {
            score += 1;
        }
        if self.rooms.is_some() {
            score += 1;
        }
        if self.year_built.is_some() {
            score += 1;
        }
        if self.latitude.is_some() && self.longitude.is_some() {
            score += 1;
        }
        if self.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            score += 1;
        }
        score
    }
}

/// One scraped observation of a property from one source URL.
///
/// Immutable once created except for the group reference, which is set
/// exactly once by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub source_url: String,
    pub features: ListingFeatures,
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// Source hostname with any `www.` prefix stripped, lowercased.
    pub fn source_domain(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.source_url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
    }
}

/// Parameters for inserting a listing. The observation timestamp comes from
/// the scraper, not the store, so replayed backfills keep their ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub source_url: String,
    pub features: ListingFeatures,
    pub created_at: DateTime<Utc>,
}

/// A cluster of listings believed to represent one physical property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyGroup {
    pub id: Uuid,
    /// Deterministic signature; absent for ad-hoc (fuzzy-only) groups.
    /// Unique across all groups when present.
    pub signature: Option<String>,
    pub city: Option<String>,
    pub area_label: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub member_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
    pub signature: Option<String>,
    pub city: Option<String>,
    pub area_label: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// How a listing was admitted to its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Exact deterministic signature equality.
    Signature,
    /// Weighted multi-factor score at or above the join threshold.
    Fuzzy,
    /// No match found — new singleton group, sentinel score.
    AdHoc,
}

/// Per-factor explanation of a match decision. Factors with missing inputs
/// on either side are omitted, never zero-filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBreakdown {
    pub method: MatchMethod,
    pub factors: BTreeMap<String, f64>,
}

impl MatchBreakdown {
    pub fn signature() -> Self {
        let mut factors = BTreeMap::new();
        factors.insert("signature".to_string(), 1.0);
        Self {
            method: MatchMethod::Signature,
            factors,
        }
    }

    pub fn ad_hoc() -> Self {
        Self {
            method: MatchMethod::AdHoc,
            factors: BTreeMap::new(),
        }
    }
}

/// The recorded relationship between one listing and its group.
/// At most one edge exists per listing; re-resolution upserts, never
/// duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEdge {
    pub id: Uuid,
    pub group_id: Uuid,
    pub listing_id: Uuid,
    /// Match score in [0, 1]. 1.0 for signature joins, the fuzzy total for
    /// fuzzy joins, the configured sentinel for ad-hoc singletons.
    pub score: f64,
    pub breakdown: MatchBreakdown,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEdge {
    pub group_id: Uuid,
    pub listing_id: Uuid,
    pub score: f64,
    pub breakdown: MatchBreakdown,
}

/// Which member was picked canonical and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotExplanation {
    pub canonical_listing_id: Uuid,
    pub completeness: i32,
    pub members_considered: i32,
}

/// A recomputed aggregate view of a group at a point in time.
///
/// Snapshots are append-only history; the most recent one is the group's
/// current public view. They are derivable purely from the member set — a
/// cache, never a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub id: Uuid,
    pub group_id: Uuid,

    // Canonical member fields
    pub title: Option<String>,
    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub floor: Option<i32>,
    pub year_built: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,

    // Aggregates across members
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    /// Distinct source domains, sorted. `source_count` equals its length.
    pub source_domains: Vec<String>,
    pub source_count: i32,

    pub explanation: SnapshotExplanation,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub group_id: Uuid,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub floor: Option<i32>,
    pub year_built: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub source_domains: Vec<String>,
    pub source_count: i32,
    pub explanation: SnapshotExplanation,
}
