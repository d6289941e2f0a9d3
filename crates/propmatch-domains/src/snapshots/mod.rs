use std::collections::BTreeSet;

use anyhow::{bail, Result};
use uuid::Uuid;

use propmatch_core::{
    EngineDeps, GroupSnapshot, Listing, NewSnapshot, PropMatchError, SnapshotExplanation,
};

/// Recompute a group's canonical view from its current members.
///
/// Picks the most complete, most recent member as canonical, aggregates
/// price range and distinct source domains, appends a new snapshot row, and
/// updates the group's denormalized member count and centroid. Idempotent
/// for a fixed member set — only timestamps differ between runs.
///
/// Never mutates listings. Callable directly by admin tooling after a
/// manual split or merge, as well as by the resolver.
pub async fn rebuild_snapshot(deps: &EngineDeps, group_id: Uuid) -> Result<GroupSnapshot> {
    let store = deps.store.as_ref();

    if store.group(group_id).await?.is_none() {
        return Err(PropMatchError::GroupNotFound(group_id).into());
    }

    let mut members = store.members_of(group_id).await?;
    if members.is_empty() {
        bail!("group {group_id} has no members to snapshot");
    }

    sort_by_completeness(&mut members);
    let canonical = &members[0];

    let prices: Vec<f64> = members.iter().filter_map(|m| m.features.price).collect();
    let price_min = prices.iter().copied().fold(None, fold_min);
    let price_max = prices.iter().copied().fold(None, fold_max);

    let domains: BTreeSet<String> = members.iter().filter_map(|m| m.source_domain()).collect();
    let source_domains: Vec<String> = domains.into_iter().collect();
    let source_count = source_domains.len() as i32;

    let explanation = SnapshotExplanation {
        canonical_listing_id: canonical.id,
        completeness: canonical.features.completeness(),
        members_considered: members.len() as i32,
    };

    let snapshot = store
        .insert_snapshot(NewSnapshot {
            group_id,
            title: canonical.features.title.clone(),
            price: canonical.features.price,
            area_m2: canonical.features.area_m2,
            rooms: canonical.features.rooms,
            floor: canonical.features.floor,
            year_built: canonical.features.year_built,
            latitude: canonical.features.latitude,
            longitude: canonical.features.longitude,
            photo_url: canonical.features.photo_url.clone(),
            price_min,
            price_max,
            source_domains,
            source_count,
            explanation,
        })
        .await?;

    store
        .update_group_rollup(
            group_id,
            members.len() as i32,
            canonical.features.latitude,
            canonical.features.longitude,
        )
        .await?;

    tracing::info!(
        group_id = %group_id,
        canonical_listing_id = %canonical.id,
        members = members.len(),
        sources = snapshot.source_count,
        "Snapshot rebuilt"
    );

    Ok(snapshot)
}

/// Canonical ordering: completeness descending, ties broken toward the
/// newest observation.
fn sort_by_completeness(members: &mut [Listing]) {
    members.sort_by(|a, b| {
        b.features
            .completeness()
            .cmp(&a.features.completeness())
            .then(b.created_at.cmp(&a.created_at))
    });
}

fn fold_min(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.min(v)))
}

fn fold_max(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}
