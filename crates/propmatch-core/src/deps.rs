use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::types::{
    GroupEdge, GroupSnapshot, Listing, NewEdge, NewGroup, NewListing, NewSnapshot, PropertyGroup,
};

/// Record store consumed by the resolver and snapshot builder.
///
/// Dyn-compatible so tests and local runs can substitute an in-memory fake
/// for the Postgres-backed implementation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_listing(&self, listing: NewListing) -> Result<Listing>;

    async fn listing(&self, id: Uuid) -> Result<Option<Listing>>;

    async fn group(&self, id: Uuid) -> Result<Option<PropertyGroup>>;

    /// Point lookup by exact signature equality.
    async fn find_group_by_signature(&self, signature: &str) -> Result<Option<PropertyGroup>>;

    /// Create a group. When the signature is present and a group already
    /// carries it, the existing group is returned instead — the store
    /// enforces signature uniqueness, which is what keeps the concurrent
    /// signature-path find-or-create race benign.
    async fn create_group(&self, group: NewGroup) -> Result<PropertyGroup>;

    /// Recently created listings that already belong to some group, newest
    /// first, bounded by `limit` and `since`. Candidate pool for the fuzzy
    /// fallback.
    async fn recent_grouped_listings(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Listing>>;

    async fn edge_for_listing(&self, listing_id: Uuid) -> Result<Option<GroupEdge>>;

    /// Record a listing's membership. Upserts on listing id — a listing has
    /// at most one edge — and sets the listing's group reference.
    async fn upsert_edge(&self, edge: NewEdge) -> Result<GroupEdge>;

    /// All listings currently linked to a group, newest first.
    async fn members_of(&self, group_id: Uuid) -> Result<Vec<Listing>>;

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<GroupSnapshot>;

    async fn latest_snapshot(&self, group_id: Uuid) -> Result<Option<GroupSnapshot>>;

    /// Snapshot history, newest first, for audit display.
    async fn snapshots_for_group(&self, group_id: Uuid, limit: i64) -> Result<Vec<GroupSnapshot>>;

    /// Update a group's denormalized member count and centroid. Coordinates
    /// overwrite only when provided.
    async fn update_group_rollup(
        &self,
        group_id: Uuid,
        member_count: i32,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()>;
}

/// Downstream cache invalidation, keyed by group id.
///
/// Best-effort fire-and-forget: callers log failures and move on. An
/// unassigned listing is worse than a stale cached view.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_group(&self, group_id: Uuid) -> Result<()>;
}

/// Invalidator that does nothing. Used by admin tooling and tests.
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn invalidate_group(&self, _group_id: Uuid) -> Result<()> {
        Ok(())
    }
}

/// Central dependency container passed to the resolver and snapshot builder.
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<dyn RecordStore>,
    pub invalidator: Arc<dyn CacheInvalidator>,
    pub config: AppConfig,
}

impl EngineDeps {
    pub fn new(
        store: Arc<dyn RecordStore>,
        invalidator: Arc<dyn CacheInvalidator>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            invalidator,
            config,
        }
    }
}
