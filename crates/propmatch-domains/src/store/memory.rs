use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use propmatch_core::{
    GroupEdge, GroupSnapshot, Listing, NewEdge, NewGroup, NewListing, NewSnapshot, PropertyGroup,
    RecordStore,
};

/// In-memory record store for tests and local experiments.
///
/// Mirrors the Postgres store's semantics: signature uniqueness on group
/// creation (find-or-create), one edge per listing (upsert sets the
/// listing's group reference), append-only snapshots.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    listings: HashMap<Uuid, Listing>,
    groups: HashMap<Uuid, PropertyGroup>,
    /// Keyed by listing id — the one-edge-per-listing invariant in type form.
    edges: HashMap<Uuid, GroupEdge>,
    snapshots: Vec<GroupSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_listing(&self, listing: NewListing) -> Result<Listing> {
        let mut inner = self.inner.write().await;
        let row = Listing {
            id: Uuid::new_v4(),
            source_url: listing.source_url,
            features: listing.features,
            group_id: None,
            created_at: listing.created_at,
        };
        inner.listings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn listing(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.inner.read().await.listings.get(&id).cloned())
    }

    async fn group(&self, id: Uuid) -> Result<Option<PropertyGroup>> {
        Ok(self.inner.read().await.groups.get(&id).cloned())
    }

    async fn find_group_by_signature(&self, signature: &str) -> Result<Option<PropertyGroup>> {
        Ok(self
            .inner
            .read()
            .await
            .groups
            .values()
            .find(|g| g.signature.as_deref() == Some(signature))
            .cloned())
    }

    async fn create_group(&self, group: NewGroup) -> Result<PropertyGroup> {
        let mut inner = self.inner.write().await;

        if let Some(signature) = group.signature.as_deref() {
            if let Some(existing) = inner
                .groups
                .values()
                .find(|g| g.signature.as_deref() == Some(signature))
            {
                return Ok(existing.clone());
            }
        }

        let now = Utc::now();
        let row = PropertyGroup {
            id: Uuid::new_v4(),
            signature: group.signature,
            city: group.city,
            area_label: group.area_label,
            latitude: group.latitude,
            longitude: group.longitude,
            member_count: 0,
            created_at: now,
            updated_at: now,
        };
        inner.groups.insert(row.id, row.clone());
        Ok(row)
    }

    async fn recent_grouped_listings(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Listing>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| l.group_id.is_some() && l.created_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn edge_for_listing(&self, listing_id: Uuid) -> Result<Option<GroupEdge>> {
        Ok(self.inner.read().await.edges.get(&listing_id).cloned())
    }

    async fn upsert_edge(&self, edge: NewEdge) -> Result<GroupEdge> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let row = match inner.edges.get(&edge.listing_id) {
            Some(existing) => GroupEdge {
                id: existing.id,
                group_id: edge.group_id,
                listing_id: edge.listing_id,
                score: edge.score,
                breakdown: edge.breakdown,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => GroupEdge {
                id: Uuid::new_v4(),
                group_id: edge.group_id,
                listing_id: edge.listing_id,
                score: edge.score,
                breakdown: edge.breakdown,
                created_at: now,
                updated_at: now,
            },
        };
        inner.edges.insert(row.listing_id, row.clone());

        if let Some(listing) = inner.listings.get_mut(&row.listing_id) {
            listing.group_id = Some(row.group_id);
        }

        Ok(row)
    }

    async fn members_of(&self, group_id: Uuid) -> Result<Vec<Listing>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Listing> = inner
            .listings
            .values()
            .filter(|l| l.group_id == Some(group_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<GroupSnapshot> {
        let mut inner = self.inner.write().await;
        let row = GroupSnapshot {
            id: Uuid::new_v4(),
            group_id: snapshot.group_id,
            title: snapshot.title,
            price: snapshot.price,
            area_m2: snapshot.area_m2,
            rooms: snapshot.rooms,
            floor: snapshot.floor,
            year_built: snapshot.year_built,
            latitude: snapshot.latitude,
            longitude: snapshot.longitude,
            photo_url: snapshot.photo_url,
            price_min: snapshot.price_min,
            price_max: snapshot.price_max,
            source_domains: snapshot.source_domains,
            source_count: snapshot.source_count,
            explanation: snapshot.explanation,
            created_at: Utc::now(),
        };
        inner.snapshots.push(row.clone());
        Ok(row)
    }

    async fn latest_snapshot(&self, group_id: Uuid) -> Result<Option<GroupSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.group_id == group_id)
            .last()
            .cloned())
    }

    async fn snapshots_for_group(&self, group_id: Uuid, limit: i64) -> Result<Vec<GroupSnapshot>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<GroupSnapshot> = inner
            .snapshots
            .iter()
            .filter(|s| s.group_id == group_id)
            .cloned()
            .collect();
        rows.reverse();
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn update_group_rollup(
        &self,
        group_id: Uuid,
        member_count: i32,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(group) = inner.groups.get_mut(&group_id) {
            group.member_count = member_count;
            if latitude.is_some() {
                group.latitude = latitude;
            }
            if longitude.is_some() {
                group.longitude = longitude;
            }
            group.updated_at = Utc::now();
        }
        Ok(())
    }
}
