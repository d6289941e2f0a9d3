use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use propmatch_core::{
    AppConfig, EngineDeps, ListingFeatures, MatchMethod, NewEdge, NewGroup, NewListing,
    NoopInvalidator, MatchBreakdown, RecordStore,
};
use propmatch_domains::store::MemoryStore;
use propmatch_domains::{rebuild_snapshot, resolve_listing};

fn engine() -> (Arc<MemoryStore>, EngineDeps) {
    let store = Arc::new(MemoryStore::new());
    let deps = EngineDeps::new(store.clone(), Arc::new(NoopInvalidator), AppConfig::default());
    (store, deps)
}

fn unirii_features() -> ListingFeatures {
    ListingFeatures {
        title: Some("Apartament 2 camere Unirii".to_string()),
        price: Some(95_400.0),
        area_m2: Some(55.0),
        rooms: Some(2),
        latitude: Some(44.4274),
        longitude: Some(26.1032),
        city: Some("Bucuresti".to_string()),
        area_label: Some("Unirii".to_string()),
        ..ListingFeatures::new()
    }
}

async fn insert(
    store: &MemoryStore,
    url: &str,
    features: ListingFeatures,
    age_minutes: i64,
) -> Uuid {
    store
        .insert_listing(NewListing {
            source_url: url.to_string(),
            features,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn signature_match_lands_in_same_group() {
    let (store, deps) = engine();

    let a = insert(&store, "https://www.imobiliare.ro/a", unirii_features(), 20).await;
    let mut features_b = unirii_features();
    // Rounds to the same 4-decimal cell
    features_b.latitude = Some(44.42741);
    let b = insert(&store, "https://storia.ro/b", features_b, 10).await;

    let first = resolve_listing(&deps, a).await.unwrap();
    let second = resolve_listing(&deps, b).await.unwrap();

    assert_eq!(first.group_id, second.group_id);
    assert_eq!(first.breakdown.method, MatchMethod::Signature);
    assert_eq!(second.breakdown.method, MatchMethod::Signature);
    assert_eq!(first.score, 1.0);
    assert_eq!(second.score, 1.0);

    let group = store.group(first.group_id).await.unwrap().unwrap();
    assert!(group.signature.is_some());
    assert_eq!(group.member_count, 2);
}

#[tokio::test]
async fn fuzzy_match_joins_nearby_listing_group() {
    let (store, deps) = engine();

    let a = insert(&store, "https://www.imobiliare.ro/a", unirii_features(), 30).await;
    let resolved_a = resolve_listing(&deps, a).await.unwrap();

    // No price, so no signature — forced onto the fuzzy path
    let features_b = ListingFeatures {
        title: Some("Apartament 2 camere Unirii".to_string()),
        price: None,
        area_m2: Some(54.9),
        latitude: Some(44.4275),
        longitude: Some(26.1033),
        ..ListingFeatures::new()
    };
    let b = insert(&store, "https://storia.ro/b", features_b, 5).await;
    let resolved_b = resolve_listing(&deps, b).await.unwrap();

    assert_eq!(resolved_b.group_id, resolved_a.group_id);
    assert_eq!(resolved_b.breakdown.method, MatchMethod::Fuzzy);
    assert!(resolved_b.score >= 0.7, "score was {}", resolved_b.score);
    assert!(resolved_b.breakdown.factors.contains_key("text"));
    assert!(resolved_b.breakdown.factors.contains_key("geo"));
    assert!(resolved_b.breakdown.factors.contains_key("area"));
    assert!(!resolved_b.breakdown.factors.contains_key("price"));
}

#[tokio::test]
async fn distant_unrelated_listing_gets_adhoc_group() {
    let (store, deps) = engine();

    let a = insert(&store, "https://www.imobiliare.ro/a", unirii_features(), 30).await;
    let resolved_a = resolve_listing(&deps, a).await.unwrap();

    // ~5km away, disjoint text, no price (no signature)
    let features_c = ListingFeatures {
        title: Some("Vila Pipera cu piscina".to_string()),
        price: None,
        area_m2: Some(180.0),
        latitude: Some(44.4724),
        longitude: Some(26.1032),
        ..ListingFeatures::new()
    };
    let c = insert(&store, "https://olx.ro/c", features_c, 5).await;
    let resolved_c = resolve_listing(&deps, c).await.unwrap();

    assert_ne!(resolved_c.group_id, resolved_a.group_id);
    assert_eq!(resolved_c.breakdown.method, MatchMethod::AdHoc);
    assert_eq!(resolved_c.score, 0.5);
    assert!(resolved_c.breakdown.factors.is_empty());
}

#[tokio::test]
async fn resolve_is_idempotent() {
    let (store, deps) = engine();

    let a = insert(&store, "https://www.imobiliare.ro/a", unirii_features(), 20).await;
    let first = resolve_listing(&deps, a).await.unwrap();
    let snapshots_after_first = store
        .snapshots_for_group(first.group_id, 100)
        .await
        .unwrap()
        .len();

    let second = resolve_listing(&deps, a).await.unwrap();
    assert_eq!(first.group_id, second.group_id);
    assert_eq!(first.score, second.score);

    // The short-circuit writes nothing: no new snapshot, still one edge
    let snapshots_after_second = store
        .snapshots_for_group(first.group_id, 100)
        .await
        .unwrap()
        .len();
    assert_eq!(snapshots_after_first, snapshots_after_second);

    let group = store.group(first.group_id).await.unwrap().unwrap();
    assert_eq!(group.member_count, 1);
}

#[tokio::test]
async fn missing_listing_is_an_error() {
    let (_store, deps) = engine();
    let result = resolve_listing(&deps, Uuid::new_v4()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn dangling_group_reference_fails_loudly() {
    let (store, deps) = engine();

    let a = insert(&store, "https://www.imobiliare.ro/a", unirii_features(), 20).await;
    // Simulate corruption: an edge pointing at a group that was never created
    store
        .upsert_edge(NewEdge {
            group_id: Uuid::new_v4(),
            listing_id: a,
            score: 1.0,
            breakdown: MatchBreakdown::signature(),
        })
        .await
        .unwrap();

    let result = resolve_listing(&deps, a).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn snapshot_picks_most_complete_member() {
    let (store, deps) = engine();

    let group = store
        .create_group(NewGroup {
            signature: None,
            city: None,
            area_label: None,
            latitude: None,
            longitude: None,
        })
        .await
        .unwrap();

    // Completeness 4: price, area, rooms, title
    let four = ListingFeatures {
        price: Some(95_000.0),
        area_m2: Some(55.0),
        rooms: Some(2),
        title: Some("Apartament 2 camere".to_string()),
        ..ListingFeatures::new()
    };
    // Completeness 6: everything
    let six = ListingFeatures {
        price: Some(97_500.0),
        area_m2: Some(55.0),
        rooms: Some(2),
        year_built: Some(1984),
        latitude: Some(44.4274),
        longitude: Some(26.1032),
        title: Some("Apartament 2 camere Unirii etaj 3".to_string()),
        ..ListingFeatures::new()
    };
    // Completeness 3: price, area, rooms
    let three = ListingFeatures {
        price: Some(96_000.0),
        area_m2: Some(54.0),
        rooms: Some(2),
        ..ListingFeatures::new()
    };

    let mut winner = Uuid::nil();
    for (i, (url, features)) in [
        ("https://www.imobiliare.ro/a", four),
        ("https://storia.ro/b", six),
        ("https://imobiliare.ro/c", three),
    ]
    .into_iter()
    .enumerate()
    {
        let id = insert(&store, url, features, 60 - i as i64).await;
        store
            .upsert_edge(NewEdge {
                group_id: group.id,
                listing_id: id,
                score: 0.8,
                breakdown: MatchBreakdown::ad_hoc(),
            })
            .await
            .unwrap();
        if i == 1 {
            winner = id;
        }
    }

    let snapshot = rebuild_snapshot(&deps, group.id).await.unwrap();

    assert_eq!(snapshot.explanation.canonical_listing_id, winner);
    assert_eq!(snapshot.explanation.completeness, 6);
    assert_eq!(snapshot.explanation.members_considered, 3);

    // Canonical fields come from the winner
    assert_eq!(snapshot.price, Some(97_500.0));
    assert_eq!(snapshot.year_built, Some(1984));

    // Aggregates span all members
    assert_eq!(snapshot.price_min, Some(95_000.0));
    assert_eq!(snapshot.price_max, Some(97_500.0));

    // www.imobiliare.ro and imobiliare.ro collapse to one domain
    assert_eq!(
        snapshot.source_domains,
        vec!["imobiliare.ro".to_string(), "storia.ro".to_string()]
    );
    assert_eq!(snapshot.source_count, 2);
    assert_eq!(snapshot.source_count as usize, snapshot.source_domains.len());

    // Group rollup updated from the canonical member
    let group = store.group(group.id).await.unwrap().unwrap();
    assert_eq!(group.member_count, 3);
    assert_eq!(group.latitude, Some(44.4274));
}

#[tokio::test]
async fn rebuild_snapshot_is_idempotent() {
    let (store, deps) = engine();

    let a = insert(&store, "https://www.imobiliare.ro/a", unirii_features(), 20).await;
    let resolved = resolve_listing(&deps, a).await.unwrap();

    let first = rebuild_snapshot(&deps, resolved.group_id).await.unwrap();
    let second = rebuild_snapshot(&deps, resolved.group_id).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.title, second.title);
    assert_eq!(first.price, second.price);
    assert_eq!(first.price_min, second.price_min);
    assert_eq!(first.price_max, second.price_max);
    assert_eq!(first.source_domains, second.source_domains);
    assert_eq!(first.source_count, second.source_count);
    assert_eq!(
        first.explanation.canonical_listing_id,
        second.explanation.canonical_listing_id
    );

    // History is append-only
    let history = store
        .snapshots_for_group(resolved.group_id, 100)
        .await
        .unwrap();
    assert!(history.len() >= 3); // one from resolve, two manual rebuilds
    assert_eq!(history[0].id, second.id);
}

#[tokio::test]
async fn rebuild_snapshot_unknown_group_is_an_error() {
    let (_store, deps) = engine();
    let result = rebuild_snapshot(&deps, Uuid::new_v4()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn candidate_window_excludes_stale_listings() {
    let (store, deps) = engine();

    // Grouped listing from far outside the 45-day window
    let stale = insert(
        &store,
        "https://www.imobiliare.ro/old",
        unirii_features(),
        60 * 24 * 90,
    )
    .await;
    resolve_listing(&deps, stale).await.unwrap();

    // Near-identical new listing without a signature: its only potential
    // match is outside the window, so it must open an ad-hoc group
    let features = ListingFeatures {
        title: Some("Apartament 2 camere Unirii".to_string()),
        area_m2: Some(55.0),
        latitude: Some(44.4274),
        longitude: Some(26.1032),
        ..ListingFeatures::new()
    };
    let fresh = insert(&store, "https://storia.ro/new", features, 5).await;
    let resolved = resolve_listing(&deps, fresh).await.unwrap();

    assert_eq!(resolved.breakdown.method, MatchMethod::AdHoc);
}
