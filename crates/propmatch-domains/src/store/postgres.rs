use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use propmatch_core::{
    GroupEdge, GroupSnapshot, Listing, ListingFeatures, MatchBreakdown, NewEdge, NewGroup,
    NewListing, NewSnapshot, PropertyGroup, RecordStore, SnapshotExplanation,
};

/// Postgres-backed record store.
///
/// The `UNIQUE` constraint on `property_groups.signature` plus the
/// `ON CONFLICT DO NOTHING` find-or-create in [`create_group`] is what makes
/// concurrent signature-path resolution safe; see DESIGN.md for the
/// remaining ad-hoc race.
///
/// [`create_group`]: RecordStore::create_group
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    source_url: String,
    features: Json<ListingFeatures>,
    group_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Self {
            id: row.id,
            source_url: row.source_url,
            features: row.features.0,
            group_id: row.group_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: Uuid,
    group_id: Uuid,
    listing_id: Uuid,
    score: f64,
    breakdown: Json<MatchBreakdown>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EdgeRow> for GroupEdge {
    fn from(row: EdgeRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            listing_id: row.listing_id,
            score: row.score,
            breakdown: row.breakdown.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    signature: Option<String>,
    city: Option<String>,
    area_label: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    member_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for PropertyGroup {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            signature: row.signature,
            city: row.city,
            area_label: row.area_label,
            latitude: row.latitude,
            longitude: row.longitude,
            member_count: row.member_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    group_id: Uuid,
    title: Option<String>,
    price: Option<f64>,
    area_m2: Option<f64>,
    rooms: Option<i32>,
    floor: Option<i32>,
    year_built: Option<i32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    photo_url: Option<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    source_domains: Json<Vec<String>>,
    source_count: i32,
    explanation: Json<SnapshotExplanation>,
    created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for GroupSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            title: row.title,
            price: row.price,
            area_m2: row.area_m2,
            rooms: row.rooms,
            floor: row.floor,
            year_built: row.year_built,
            latitude: row.latitude,
            longitude: row.longitude,
            photo_url: row.photo_url,
            price_min: row.price_min,
            price_max: row.price_max,
            source_domains: row.source_domains.0,
            source_count: row.source_count,
            explanation: row.explanation.0,
            created_at: row.created_at,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_listing(&self, listing: NewListing) -> Result<Listing> {
        let row = sqlx::query_as::<_, ListingRow>(
            r#"
            INSERT INTO listings (source_url, features, created_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&listing.source_url)
        .bind(Json(&listing.features))
        .bind(listing.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn group(&self, id: Uuid) -> Result<Option<PropertyGroup>> {
        let row = sqlx::query_as::<_, GroupRow>("SELECT * FROM property_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_group_by_signature(&self, signature: &str) -> Result<Option<PropertyGroup>> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM property_groups WHERE signature = $1",
        )
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_group(&self, group: NewGroup) -> Result<PropertyGroup> {
        // Find-or-create: the unique constraint on signature absorbs the
        // concurrent-creation race, and the loser re-selects the winner's row.
        let inserted = sqlx::query_as::<_, GroupRow>(
            r#"
            INSERT INTO property_groups (signature, city, area_label, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (signature) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&group.signature)
        .bind(&group.city)
        .bind(&group.area_label)
        .bind(group.latitude)
        .bind(group.longitude)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // NULL signatures never conflict, so a missing row means another
        // writer won the race on this signature.
        let signature = group.signature.as_deref().ok_or_else(|| {
            anyhow::anyhow!("group insert returned no row despite having no signature")
        })?;
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT * FROM property_groups WHERE signature = $1",
        )
        .bind(signature)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn recent_grouped_listings(
        &self,
        limit: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT * FROM listings
            WHERE group_id IS NOT NULL
              AND created_at >= $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn edge_for_listing(&self, listing_id: Uuid) -> Result<Option<GroupEdge>> {
        let row = sqlx::query_as::<_, EdgeRow>("SELECT * FROM group_edges WHERE listing_id = $1")
            .bind(listing_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_edge(&self, edge: NewEdge) -> Result<GroupEdge> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, EdgeRow>(
            r#"
            INSERT INTO group_edges (group_id, listing_id, score, breakdown)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (listing_id) DO UPDATE
                SET group_id = EXCLUDED.group_id,
                    score = EXCLUDED.score,
                    breakdown = EXCLUDED.breakdown,
                    updated_at = now()
            RETURNING *
            "#,
        )
        .bind(edge.group_id)
        .bind(edge.listing_id)
        .bind(edge.score)
        .bind(Json(&edge.breakdown))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE listings SET group_id = $1 WHERE id = $2")
            .bind(edge.group_id)
            .bind(edge.listing_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn members_of(&self, group_id: Uuid) -> Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            "SELECT * FROM listings WHERE group_id = $1 ORDER BY created_at DESC",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<GroupSnapshot> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            INSERT INTO group_snapshots (
                group_id, title, price, area_m2, rooms, floor, year_built,
                latitude, longitude, photo_url, price_min, price_max,
                source_domains, source_count, explanation
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(snapshot.group_id)
        .bind(&snapshot.title)
        .bind(snapshot.price)
        .bind(snapshot.area_m2)
        .bind(snapshot.rooms)
        .bind(snapshot.floor)
        .bind(snapshot.year_built)
        .bind(snapshot.latitude)
        .bind(snapshot.longitude)
        .bind(&snapshot.photo_url)
        .bind(snapshot.price_min)
        .bind(snapshot.price_max)
        .bind(Json(&snapshot.source_domains))
        .bind(snapshot.source_count)
        .bind(Json(&snapshot.explanation))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn latest_snapshot(&self, group_id: Uuid) -> Result<Option<GroupSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT * FROM group_snapshots
            WHERE group_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn snapshots_for_group(&self, group_id: Uuid, limit: i64) -> Result<Vec<GroupSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT * FROM group_snapshots
            WHERE group_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_group_rollup(
        &self,
        group_id: Uuid,
        member_count: i32,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE property_groups
            SET member_count = $2,
                latitude = COALESCE($3, latitude),
                longitude = COALESCE($4, longitude),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .bind(member_count)
        .bind(latitude)
        .bind(longitude)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
