use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use propmatch_core::{
    EngineDeps, Listing, MatchBreakdown, MatchMethod, NewEdge, NewGroup, PropMatchError,
};

use crate::grouping::scoring::fuzzy_score;
use crate::grouping::signature::build_signature;
use crate::snapshots::rebuild_snapshot;

/// Outcome of resolving one listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub group_id: Uuid,
    pub score: f64,
    pub breakdown: MatchBreakdown,
}

struct Assignment {
    group_id: Uuid,
    score: f64,
    breakdown: MatchBreakdown,
}

/// Decide which group a newly extracted listing belongs to and persist the
/// decision.
///
/// Ordered steps: signature exact match (find-or-create), fuzzy fallback
/// over a bounded recency window, join-or-create, snapshot rebuild, cache
/// invalidation. The last two are best-effort — their failures are logged
/// and swallowed, never rolling back the group assignment.
///
/// Idempotent: a listing that already has an edge short-circuits to its
/// existing group without writing anything.
pub async fn resolve_listing(deps: &EngineDeps, listing_id: Uuid) -> Result<Resolution> {
    let store = deps.store.as_ref();

    let listing = store
        .listing(listing_id)
        .await?
        .ok_or(PropMatchError::ListingNotFound(listing_id))?;

    if let Some(edge) = store.edge_for_listing(listing_id).await? {
        if store.group(edge.group_id).await?.is_none() {
            tracing::error!(
                listing_id = %listing_id,
                group_id = %edge.group_id,
                score = edge.score,
                "Listing edge references a group that does not exist"
            );
            return Err(PropMatchError::DanglingGroupRef {
                listing_id,
                group_id: edge.group_id,
            }
            .into());
        }
        tracing::debug!(
            listing_id = %listing_id,
            group_id = %edge.group_id,
            "Listing already grouped, short-circuiting"
        );
        return Ok(Resolution {
            group_id: edge.group_id,
            score: edge.score,
            breakdown: edge.breakdown,
        });
    }

    let assignment = match build_signature(&listing.features, deps.config.price_band_size) {
        Some(signature) => resolve_by_signature(deps, &listing, signature).await?,
        None => resolve_by_fuzzy(deps, &listing).await?,
    };

    let edge = store
        .upsert_edge(NewEdge {
            group_id: assignment.group_id,
            listing_id: listing.id,
            score: assignment.score,
            breakdown: assignment.breakdown,
        })
        .await?;

    tracing::info!(
        listing_id = %listing.id,
        group_id = %edge.group_id,
        score = edge.score,
        method = ?edge.breakdown.method,
        "Listing grouped"
    );

    // Membership is durable at this point. A stale cached view is
    // acceptable; an unassigned listing is not.
    if let Err(err) = rebuild_snapshot(deps, edge.group_id).await {
        tracing::warn!(
            group_id = %edge.group_id,
            error = %err,
            "Snapshot rebuild failed after grouping"
        );
    }
    if let Err(err) = deps.invalidator.invalidate_group(edge.group_id).await {
        tracing::warn!(
            group_id = %edge.group_id,
            error = %err,
            "Cache invalidation failed"
        );
    }

    Ok(Resolution {
        group_id: edge.group_id,
        score: edge.score,
        breakdown: edge.breakdown,
    })
}

/// Exact deterministic path: one group per signature, created lazily. The
/// store's uniqueness guarantee on signatures keeps concurrent find-or-create
/// benign.
async fn resolve_by_signature(
    deps: &EngineDeps,
    listing: &Listing,
    signature: String,
) -> Result<Assignment> {
    let store = deps.store.as_ref();

    let group = match store.find_group_by_signature(&signature).await? {
        Some(group) => group,
        None => {
            store
                .create_group(NewGroup {
                    signature: Some(signature),
                    city: listing.features.city.clone(),
                    area_label: listing.features.area_label.clone(),
                    latitude: listing.features.latitude,
                    longitude: listing.features.longitude,
                })
                .await?
        }
    };

    Ok(Assignment {
        group_id: group.id,
        score: 1.0,
        breakdown: MatchBreakdown::signature(),
    })
}

/// Fuzzy fallback: score the listing against a bounded window of recently
/// grouped listings and join the best candidate's group if it clears the
/// threshold; otherwise open a new ad-hoc group.
///
/// The ad-hoc sentinel score means "unverified singleton", not "50%
/// confident duplicate".
async fn resolve_by_fuzzy(deps: &EngineDeps, listing: &Listing) -> Result<Assignment> {
    let store = deps.store.as_ref();
    let config = &deps.config;

    let since = Utc::now() - Duration::days(config.candidate_window_days);
    let candidates = store
        .recent_grouped_listings(config.candidate_limit, since)
        .await?;

    let mut best: Option<(Uuid, crate::grouping::scoring::FuzzyScore)> = None;
    for candidate in &candidates {
        if candidate.id == listing.id {
            continue;
        }
        let Some(group_id) = candidate.group_id else {
            continue;
        };
        let score = fuzzy_score(&listing.features, &candidate.features, config);
        let better = best
            .as_ref()
            .map(|(_, current)| score.total > current.total)
            .unwrap_or(true);
        if better {
            best = Some((group_id, score));
        }
    }

    if let Some((group_id, score)) = best {
        if score.total >= config.fuzzy_join_threshold {
            tracing::debug!(
                listing_id = %listing.id,
                group_id = %group_id,
                score = score.total,
                candidates = candidates.len(),
                "Fuzzy match accepted"
            );
            return Ok(Assignment {
                group_id,
                score: score.total.min(1.0),
                breakdown: MatchBreakdown {
                    method: MatchMethod::Fuzzy,
                    factors: score.factors,
                },
            });
        }
    }

    let group = store
        .create_group(NewGroup {
            signature: None,
            city: listing.features.city.clone(),
            area_label: listing.features.area_label.clone(),
            latitude: listing.features.latitude,
            longitude: listing.features.longitude,
        })
        .await?;

    tracing::debug!(
        listing_id = %listing.id,
        group_id = %group.id,
        candidates = candidates.len(),
        "No match above threshold, created ad-hoc group"
    );

    Ok(Assignment {
        group_id: group.id,
        score: config.adhoc_sentinel_score,
        breakdown: MatchBreakdown::ad_hoc(),
    })
}
